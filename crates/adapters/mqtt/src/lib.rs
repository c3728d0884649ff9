//! # relayhub-adapter-mqtt
//!
//! MQTT adapter: bridges MQTT-based devices into relayhub.
//!
//! ## How it works
//!
//! One `mosquitto_sub -v` process subscribes to the configured topic
//! filters and every `topic payload` line it prints is pushed through a
//! filter tree. Each device registers a leaf matching its state topic and
//! observes the decoded payload. Commanding a device runs `mosquitto_pub`
//! on its command topic.
//!
//! ## Device spec
//!
//! ```toml
//! device = "kitchen/light"                                 # plain protocol
//! device = { topic = "blinds/1", protocol = "covering" }
//! ```
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `relayhub-app` and `relayhub-kernel`.

mod config;
mod error;
mod protocol;

pub use config::MqttConfig;
pub use error::MqttError;
pub use protocol::Protocol;

use std::sync::Arc;
use std::time::Duration;

use relayhub_app::exec;
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_app::ServiceError;
use relayhub_kernel::{BoxError, Connector, ProcessSource, Value};
use serde::Deserialize;

/// Registry key of this adapter.
pub const KIND: &str = "mqtt";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceSpec {
    Topic(String),
    Full {
        topic: String,
        #[serde(default = "plain")]
        protocol: String,
    },
}

fn plain() -> String {
    "plain".to_string()
}

/// MQTT integration backed by the mosquitto command line clients.
pub struct MqttService {
    name: String,
    config: Arc<MqttConfig>,
    listener: ProcessSource,
}

impl MqttService {
    /// Create the service; the subscriber starts with [`Service::start`].
    #[must_use]
    pub fn new(name: impl Into<String>, config: MqttConfig) -> Self {
        let name = name.into();
        tracing::info!(service = %name, host = %config.host, topics = ?config.topics, "creating MQTT listener");
        let listener = ProcessSource::new(config.subscribe_command())
            .with_backoff(Duration::from_secs(config.backoff_secs))
            .with_label(format!("{name} ({})", config.subscriber));
        Self {
            name,
            config: Arc::new(config),
            listener,
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: MqttConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    /// The subscriber process and its filter tree.
    #[must_use]
    pub fn listener(&self) -> &ProcessSource {
        &self.listener
    }

    /// Connector for the device on `topic` speaking `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::UnknownProtocol`] for an unknown protocol name.
    pub fn topic(&self, topic: &str, protocol: &str) -> Result<Connector, MqttError> {
        let protocol = self
            .config
            .protocol(protocol)
            .ok_or_else(|| MqttError::UnknownProtocol(protocol.to_string()))?;

        let publish = Publish {
            config: Arc::clone(&self.config),
            topic: protocol.command_topic(topic),
            protocol: protocol.clone(),
        };
        let connector = Connector::with_action(format!("MQTTDevice<{topic}>"), move |value: &Value| {
            publish.send(value)
        });

        let device = connector.clone();
        let topic_name = topic.to_string();
        self.listener
            .filter(&protocol.state_pattern(topic))
            .map_err(MqttError::Kernel)?
            .on_match(move |line, payload| {
                tracing::debug!(topic = %topic_name, line, "state update");
                device.set(protocol.decode(payload), false);
                Ok(())
            });

        Ok(connector)
    }
}

struct Publish {
    config: Arc<MqttConfig>,
    topic: String,
    protocol: Protocol,
}

impl Publish {
    fn send(&self, value: &Value) -> Result<(), BoxError> {
        let message = self.protocol.encode(value)?;
        tracing::info!(topic = %self.topic, message = %message, "sending MQTT command");
        exec::run(&self.config.publisher, &self.config.publish_args(&self.topic, &message))
            .map_err(MqttError::Publish)?;
        Ok(())
    }
}

impl Service for MqttService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        let connector = match parse_device(&self.name, spec)? {
            DeviceSpec::Topic(topic) => self.topic(&topic, "plain")?,
            DeviceSpec::Full { topic, protocol } => self.topic(&topic, &protocol)?,
        };
        Ok(connector)
    }

    fn start(&self) -> Result<(), ServiceError> {
        self.listener.start()?;
        Ok(())
    }

    fn stop(&self) {
        tracing::info!(service = %self.name, "stopping MQTT listener");
        self.listener.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> MqttService {
        MqttService::new(
            "mqtt",
            MqttConfig {
                publisher: "true".to_string(),
                ..MqttConfig::default()
            },
        )
    }

    #[test]
    fn should_observe_covering_state_from_subscriber_lines() {
        let service = service();
        let blind = service
            .device(&json!({ "topic": "blinds/1", "protocol": "covering" }))
            .unwrap();

        assert!(service.listener().root().dispatch("blinds/1/state open"));
        assert_eq!(blind.get(), Some(json!(1)));

        service.listener().root().dispatch("blinds/1/state closed");
        assert_eq!(blind.get(), Some(json!(0)));

        service.listener().root().dispatch("blinds/1/state jammed");
        assert_eq!(blind.get(), Some(json!("jammed")));
    }

    #[test]
    fn should_accept_bare_topic_as_plain_device() {
        let service = service();
        let lamp = service.device(&json!("kitchen/light")).unwrap();
        assert_eq!(lamp.name(), "MQTTDevice<kitchen/light>");

        service.listener().root().dispatch("kitchen/light ON");
        assert_eq!(lamp.get(), Some(json!("ON")));
        assert!(!service.listener().root().dispatch("kitchen/lights OFF"));
    }

    #[test]
    fn should_ignore_other_topics() {
        let service = service();
        let first = service.device(&json!("sensors/1")).unwrap();
        let second = service.device(&json!("sensors/2")).unwrap();

        service.listener().root().dispatch("sensors/2 21.5");
        assert_eq!(first.get(), None);
        assert_eq!(second.get(), Some(json!("21.5")));
    }

    #[test]
    fn should_keep_commanded_value_when_publisher_succeeds() {
        let service = service();
        let blind = service
            .device(&json!({ "topic": "blinds/1", "protocol": "covering" }))
            .unwrap();
        blind.command(1);
        assert_eq!(blind.get(), Some(json!(1)));
    }

    #[test]
    fn should_keep_commanded_value_when_publisher_fails() {
        let service = MqttService::new(
            "mqtt",
            MqttConfig {
                publisher: "false".to_string(),
                ..MqttConfig::default()
            },
        );
        let lamp = service.device(&json!("kitchen/light")).unwrap();
        lamp.command("ON");
        assert_eq!(lamp.get(), Some(json!("ON")));
    }

    #[test]
    fn should_reject_unknown_protocol() {
        let service = service();
        let err = service
            .device(&json!({ "topic": "x", "protocol": "zwave" }))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Adapter(_)));
    }

    #[test]
    fn should_build_from_registry_options() {
        let service = MqttService::factory("broker", json!({ "host": "10.0.0.5", "topics": ["a/#"] })).unwrap();
        assert_eq!(service.name(), "broker");
        assert_eq!(service.kind(), KIND);
        assert!(matches!(
            MqttService::factory("broker", json!({ "port": "nope" })),
            Err(ServiceError::Options { .. })
        ));
    }
}
