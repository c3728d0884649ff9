//! Bond integration configuration.

use relayhub_app::exec::quote;
use serde::Deserialize;

/// Configuration for the Bond integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BondConfig {
    /// Bridge IP address or hostname.
    pub address: String,
    /// UDP port of the push feed.
    pub port: u16,
    /// Local API token.
    pub token: String,
    /// Seconds to wait before restarting the feed.
    pub backoff_secs: u64,
    /// Seconds between keep-alive datagrams.
    pub keepalive_secs: u64,
    /// HTTP client used for commands.
    pub curl: String,
}

impl Default for BondConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 30007,
            token: String::new(),
            backoff_secs: 5,
            keepalive_secs: 60,
            curl: "curl".to_string(),
        }
    }
}

impl BondConfig {
    /// Shell command subscribing to the push feed: the bridge streams state
    /// updates to whoever keeps sending it datagrams.
    #[must_use]
    pub fn feed_command(&self) -> String {
        format!(
            "(while true; do echo; sleep {}; done) | nc -u {} {}",
            self.keepalive_secs,
            quote(&self.address),
            self.port
        )
    }

    /// Replace the token in `text` for logging.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.token, "<TOKEN>")
        }
    }
}
