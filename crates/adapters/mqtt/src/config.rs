//! MQTT integration configuration.

use std::collections::BTreeMap;

use relayhub_app::exec::quote;
use serde::Deserialize;

use crate::protocol::Protocol;

/// Configuration for the MQTT integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address.
    pub host: String,
    /// MQTT broker port.
    pub port: u16,
    /// Broker user, if authentication is enabled.
    pub username: Option<String>,
    /// Broker password, if authentication is enabled.
    pub password: Option<String>,
    /// Subscribed topic filters.
    pub topics: Vec<String>,
    /// Seconds to wait before restarting the subscriber.
    pub backoff_secs: u64,
    /// Subscriber program.
    pub subscriber: String,
    /// Publisher program.
    pub publisher: String,
    /// Extra protocols, by name; they shadow the built-in ones.
    pub protocols: BTreeMap<String, Protocol>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            topics: vec!["#".to_string()],
            backoff_secs: 5,
            subscriber: "mosquitto_sub".to_string(),
            publisher: "mosquitto_pub".to_string(),
            protocols: BTreeMap::new(),
        }
    }
}

impl MqttConfig {
    /// Look a protocol up by name, configured ones first.
    #[must_use]
    pub fn protocol(&self, name: &str) -> Option<Protocol> {
        if let Some(protocol) = self.protocols.get(name) {
            return Some(protocol.clone());
        }
        match name {
            "plain" => Some(Protocol::plain()),
            "covering" => Some(Protocol::covering()),
            _ => None,
        }
    }

    fn connection_args(&self) -> Vec<String> {
        let mut args = vec![
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
        ];
        if let Some(username) = &self.username {
            args.extend(["-u".to_string(), username.clone()]);
        }
        if let Some(password) = &self.password {
            args.extend(["-P".to_string(), password.clone()]);
        }
        args
    }

    /// Shell command line of the long-running subscriber (`-v` prefixes
    /// every payload with its topic).
    #[must_use]
    pub fn subscribe_command(&self) -> String {
        let mut words = vec![self.subscriber.clone()];
        words.extend(self.connection_args());
        for topic in &self.topics {
            words.extend(["-t".to_string(), topic.clone()]);
        }
        words.push("-v".to_string());
        words.iter().map(|word| quote(word)).collect::<Vec<_>>().join(" ")
    }

    /// Arguments for publishing `message` on `topic`.
    #[must_use]
    pub fn publish_args(&self, topic: &str, message: &str) -> Vec<String> {
        let mut args = self.connection_args();
        args.extend([
            "-t".to_string(),
            topic.to_string(),
            "-m".to_string(),
            message.to_string(),
        ]);
        args
    }
}
