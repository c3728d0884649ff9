//! Fan speed mapping and Bond local API actions.
//!
//! Connectors carry a fraction in `0.0..=1.0`; Bond fans have six speeds.
//! Exactly `1.0` means "turn on at the last speed", which Bond handles
//! itself through `TurnOn`.

use relayhub_kernel::Value;
use serde_json::json;

use crate::error::BondError;

/// Number of fan speeds.
pub const SPEEDS: u8 = 6;

/// An action of the Bond local API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanAction {
    TurnOn,
    TurnOff,
    SetSpeed(u8),
}

impl FanAction {
    /// Action realising `value`.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::InvalidSpeed`] for non-numeric or out of range
    /// values.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
    pub fn for_value(value: &Value) -> Result<Self, BondError> {
        let level = match value {
            Value::Bool(on) => return Ok(if *on { Self::TurnOn } else { Self::TurnOff }),
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
        .filter(|level| (0.0..=1.0).contains(level))
        .ok_or_else(|| BondError::InvalidSpeed(value.clone()))?;

        Ok(if level == 1.0 {
            Self::TurnOn
        } else if level == 0.0 {
            Self::TurnOff
        } else {
            let speed = (level * f64::from(SPEEDS)).round() as u8;
            Self::SetSpeed(speed.clamp(1, SPEEDS))
        })
    }

    /// Path segment of the action endpoint.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TurnOn => "TurnOn",
            Self::TurnOff => "TurnOff",
            Self::SetSpeed(_) => "SetSpeed",
        }
    }

    /// JSON request body.
    #[must_use]
    pub fn body(self) -> String {
        match self {
            Self::SetSpeed(speed) => json!({ "argument": speed }).to_string(),
            Self::TurnOn | Self::TurnOff => "{}".to_string(),
        }
    }
}

/// Connector value for a reported speed; an empty capture means the fan is
/// off.
#[must_use]
pub fn level_from_speed(captured: &str) -> Option<Value> {
    if captured.is_empty() {
        return Some(json!(0.0));
    }
    let speed: u8 = captured.parse().ok()?;
    let level = (f64::from(speed) / f64::from(SPEEDS) * 100.0).round() / 100.0;
    Some(json!(level))
}
