//! Nuki integration configuration.

use serde::Deserialize;

/// Configuration for the Nuki Web API integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NukiConfig {
    /// Web API token.
    pub api_key: String,
    /// API root, without trailing slash.
    pub base_url: String,
    /// HTTP client used for requests.
    pub curl: String,
    /// Upper bound on a request, in seconds.
    pub timeout_secs: u64,
}

impl Default for NukiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.nuki.io".to_string(),
            curl: "curl".to_string(),
            timeout_secs: 10,
        }
    }
}

impl NukiConfig {
    /// URL of smartlock `id`, followed by `path`.
    #[must_use]
    pub fn smartlock_url(&self, id: &str, path: &str) -> String {
        format!("{}/smartlock/{id}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Replace the API key in `text` for logging.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.api_key, "<API_KEY>")
        }
    }
}
