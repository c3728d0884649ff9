//! Topic and payload conventions of MQTT devices.
//!
//! A protocol says where a device reports its state and where it takes
//! commands (as suffixes of the device topic), and optionally how payloads
//! map to connector values: `states[i]` is observed as `i` and value `i` is
//! published as `commands[i]`. Without tables payloads pass through as text.

use relayhub_kernel::Value;
use relayhub_kernel::value::to_text;
use serde::Deserialize;

use crate::error::MqttError;

/// Topic suffixes and payload tables of a device family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Protocol {
    pub state_suffix: String,
    pub command_suffix: String,
    pub states: Vec<String>,
    pub commands: Vec<String>,
}

impl Protocol {
    /// Raw payloads on the device topic itself.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Blinds and shades: `closed`/`open` on `<topic>/state`,
    /// `close`/`open` on `<topic>/command`.
    #[must_use]
    pub fn covering() -> Self {
        Self {
            state_suffix: "/state".to_string(),
            command_suffix: "/command".to_string(),
            states: vec!["closed".to_string(), "open".to_string()],
            commands: vec!["close".to_string(), "open".to_string()],
        }
    }

    /// Pattern matching `mosquitto_sub -v` lines carrying this device's
    /// state; the payload is the first group.
    #[must_use]
    pub fn state_pattern(&self, topic: &str) -> String {
        let mut payload: Vec<String> = self.states.iter().map(|s| regex::escape(s)).collect();
        payload.push(".*".to_string());
        format!(
            "^{}{} ({})$",
            regex::escape(topic),
            regex::escape(&self.state_suffix),
            payload.join("|")
        )
    }

    /// Topic commands are published on.
    #[must_use]
    pub fn command_topic(&self, topic: &str) -> String {
        format!("{topic}{}", self.command_suffix)
    }

    /// Translate a received payload into a connector value.
    ///
    /// A payload missing from the state table is passed through as text.
    #[must_use]
    pub fn decode(&self, payload: &str) -> Value {
        if self.states.is_empty() {
            return Value::String(payload.to_string());
        }
        match self.states.iter().position(|state| state == payload) {
            Some(index) => Value::from(index),
            None => {
                tracing::warn!(payload, "unrecognized state");
                Value::String(payload.to_string())
            }
        }
    }

    /// Translate a connector value into the payload to publish.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError::UnknownCommand`] if the value does not index the
    /// command table.
    pub fn encode(&self, value: &Value) -> Result<String, MqttError> {
        if self.commands.is_empty() {
            return Ok(to_text(value));
        }
        command_index(value)
            .and_then(|index| self.commands.get(index))
            .cloned()
            .ok_or_else(|| MqttError::UnknownCommand(value.clone()))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn command_index(value: &Value) -> Option<usize> {
    match value {
        Value::Bool(on) => Some(usize::from(*on)),
        Value::Number(number) => number
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as usize)
            }),
        _ => None,
    }
}
