//! # relayhub-adapter-bond
//!
//! Bond adapter: fans behind a Bond bridge.
//!
//! State comes from the bridge's UDP push feed, kept open by a shell
//! pipeline around `nc -u` and dispatched through a filter tree. Commands go
//! to the local HTTP API with `curl`.
//!
//! ```toml
//! [services.bond]
//! address = "192.168.1.233"
//! token = "..."
//!
//! # endpoint
//! device = "6f9c4b1e"            # or { device = "6f9c4b1e" }
//! ```

mod action;
mod config;
mod error;

pub use action::{FanAction, SPEEDS, level_from_speed};
pub use config::BondConfig;
pub use error::BondError;

use std::sync::Arc;
use std::time::Duration;

use relayhub_app::ServiceError;
use relayhub_app::exec;
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_kernel::{BoxError, Connector, ProcessSource, Value};
use serde::Deserialize;

/// Registry key of this adapter.
pub const KIND: &str = "bond";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceSpec {
    Id(String),
    Full { device: String },
}

impl DeviceSpec {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Full { device: id } => id,
        }
    }
}

/// Bond bridge integration.
pub struct BondService {
    name: String,
    config: Arc<BondConfig>,
    feed: ProcessSource,
}

impl BondService {
    #[must_use]
    pub fn new(name: impl Into<String>, config: BondConfig) -> Self {
        let name = name.into();
        tracing::info!(service = %name, address = %config.address, port = config.port, "creating Bond service");
        let feed = ProcessSource::new(config.feed_command())
            .with_backoff(Duration::from_secs(config.backoff_secs))
            .with_label(format!("{name} (bond push feed)"));
        Self {
            name,
            config: Arc::new(config),
            feed,
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: BondConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    /// The push feed and its filter tree.
    #[must_use]
    pub fn feed(&self) -> &ProcessSource {
        &self.feed
    }

    /// Connector for the fan with Bond id `id`.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Kernel`] if the state pattern does not compile.
    pub fn fan(&self, id: &str) -> Result<Connector, BondError> {
        let config = Arc::clone(&self.config);
        let fan_id = id.to_string();
        let connector = Connector::with_action(format!("Bond<{id}>"), move |value: &Value| {
            send(&config, &fan_id, value)
        });

        let device = connector.clone();
        let pattern = format!(
            r#"devices/{}/state.*"power":(?:0|1.*"speed":(\d))"#,
            regex::escape(id)
        );
        self.feed
            .filter(&pattern)
            .map_err(BondError::Kernel)?
            .on_match(move |line, captured| {
                match level_from_speed(captured) {
                    Some(level) => {
                        tracing::info!(device = %device.name(), speed = captured, %level, "speed updated");
                        device.set(level, false);
                    }
                    None => tracing::warn!(device = %device.name(), line, "unreadable speed"),
                }
                Ok(())
            });
        Ok(connector)
    }
}

fn send(config: &BondConfig, id: &str, value: &Value) -> Result<(), BoxError> {
    let action = FanAction::for_value(value)?;
    let url = format!("http://{}/v2/devices/{id}/actions/{}", config.address, action.name());
    let token = format!("BOND-Token: {}", config.token);
    let body = action.body();
    let args = ["-sS", "-f", "-H", token.as_str(), url.as_str(), "-X", "PUT", "-d", body.as_str()];
    tracing::info!(command = %config.redact(&args.join(" ")), "running Bond command");
    exec::run(&config.curl, &args).map_err(BondError::Request)?;
    Ok(())
}

impl Service for BondService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        let id = parse_device::<DeviceSpec>(&self.name, spec)?.into_id();
        Ok(self.fan(&id)?)
    }

    fn start(&self) -> Result<(), ServiceError> {
        tracing::info!(service = %self.name, address = %self.config.address, port = self.config.port, "starting Bond listener");
        self.feed.start()?;
        Ok(())
    }

    fn stop(&self) {
        tracing::info!(service = %self.name, "stopping Bond listener");
        self.feed.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(curl: &str) -> BondService {
        BondService::new(
            "bond",
            BondConfig {
                address: "192.168.1.233".to_string(),
                token: "abc123".to_string(),
                curl: curl.to_string(),
                ..BondConfig::default()
            },
        )
    }

    #[test]
    fn should_observe_speed_from_push_feed() {
        let service = service("true");
        let fan = service.device(&json!("6f9c4b1e")).unwrap();
        assert_eq!(fan.name(), "Bond<6f9c4b1e>");

        service.feed().root().dispatch(
            r#"{"B":"ZZBL12345","t":"devices/6f9c4b1e/state","i":"00","s":200,"m":0,"f":15,"b":{"power":1,"speed":3}}"#,
        );
        assert_eq!(fan.get(), Some(json!(0.5)));

        service.feed().root().dispatch(
            r#"{"B":"ZZBL12345","t":"devices/6f9c4b1e/state","s":200,"b":{"power":0,"speed":3}}"#,
        );
        assert_eq!(fan.get(), Some(json!(0.0)));
    }

    #[test]
    fn should_ignore_other_devices() {
        let service = service("true");
        let fan = service.device(&json!({ "device": "6f9c4b1e" })).unwrap();
        let handled = service
            .feed()
            .root()
            .dispatch(r#"{"t":"devices/aaaa/state","b":{"power":1,"speed":6}}"#);
        assert!(!handled);
        assert_eq!(fan.get(), None);
    }

    #[test]
    fn should_keep_commanded_level() {
        let service = service("true");
        let fan = service.device(&json!("6f9c4b1e")).unwrap();
        fan.command(0.5);
        assert_eq!(fan.get(), Some(json!(0.5)));

        let failing = self::service("false");
        let fan = failing.device(&json!("6f9c4b1e")).unwrap();
        fan.command(1.0);
        assert_eq!(fan.get(), Some(json!(1.0)));
    }

    #[test]
    fn should_reject_malformed_device_spec() {
        let service = service("true");
        assert!(matches!(
            service.device(&json!({ "fan": 1 })),
            Err(ServiceError::Device { .. })
        ));
    }
}
