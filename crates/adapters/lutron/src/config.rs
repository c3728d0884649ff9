//! Lutron integration configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the Lutron integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LutronConfig {
    /// Main repeater hostname or IP address.
    pub host: String,
    /// Telnet port of the integration protocol.
    pub port: u16,
    /// Integration user.
    pub username: String,
    /// Integration password.
    pub password: String,
    /// Seconds to wait before reconnecting after a failure.
    pub reconnect_secs: u64,
    /// Seconds to wait for each login prompt.
    pub prompt_timeout_secs: u64,
}

impl Default for LutronConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 23,
            username: "lutron".to_string(),
            password: "integration".to_string(),
            reconnect_secs: 5,
            prompt_timeout_secs: 10,
        }
    }
}

impl LutronConfig {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }

    #[must_use]
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}
