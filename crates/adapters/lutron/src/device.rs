//! Lutron device kinds and their integration-protocol strings.
//!
//! | spec                                   | monitored event          | command                |
//! |----------------------------------------|--------------------------|------------------------|
//! | `{ output = 12 }`                      | `~OUTPUT,12,1,<level>`   | `#OUTPUT,12,1,<level>` |
//! | `{ sysvar = 4 }`                       | `~SYSVAR,4,1,<n>`        | `#SYSVAR,4,1,<n>`      |
//! | `{ keypad = 3, button = 1 }`           | `~DEVICE,3,1,3`          | `#DEVICE,3,1,3`        |
//! | `{ on = "...", off = "..." }`          | none                     | `on` / `off`           |
//!
//! Output levels are percentages on the wire and fractions on connectors.

use relayhub_kernel::Value;
use relayhub_kernel::value::is_truthy;
use serde::Deserialize;

use crate::error::LutronError;

/// Keypad button press.
pub const PRESS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum DeviceSpec {
    Output(OutputSpec),
    Sysvar(SysvarSpec),
    Keypad(KeypadSpec),
    Command(CommandSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct OutputSpec {
    pub output: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SysvarSpec {
    pub sysvar: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct KeypadSpec {
    pub keypad: u32,
    pub button: u32,
    #[serde(default = "press")]
    pub action: u32,
}

fn press() -> u32 {
    PRESS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CommandSpec {
    pub on: String,
    #[serde(default)]
    pub off: Option<String>,
}

impl DeviceSpec {
    pub fn name(&self) -> String {
        match self {
            Self::Output(spec) => format!("LutronDevice<{}>", spec.output),
            Self::Sysvar(spec) => format!("LutronSysvar<{}>", spec.sysvar),
            Self::Keypad(spec) => format!("LutronKeypad<{}, {}, {}>", spec.keypad, spec.button, spec.action),
            Self::Command(spec) => format!("LutronCommand<{}, {}>", spec.on, spec.off.as_deref().unwrap_or("-")),
        }
    }

    /// Pattern of the monitoring lines reporting this device's state.
    pub fn event_pattern(&self) -> Option<String> {
        match self {
            Self::Output(spec) => Some(format!(r"^~OUTPUT,{},1,(\d+(?:\.\d+)?)", spec.output)),
            Self::Sysvar(spec) => Some(format!(r"^~SYSVAR,{},1,(\d+)", spec.sysvar)),
            Self::Keypad(spec) => Some(format!(
                "^~DEVICE,{},{},{}(?:,|$)",
                spec.keypad, spec.button, spec.action
            )),
            Self::Command(_) => None,
        }
    }

    /// Translate the captured part of an event into a connector value.
    pub fn decode(&self, captured: &str) -> Option<Value> {
        match self {
            Self::Output(_) => captured
                .parse::<f64>()
                .ok()
                .map(|level| Value::from(level / 100.0)),
            Self::Sysvar(_) => captured.parse::<u64>().ok().map(Value::from),
            Self::Keypad(_) => Some(Value::Bool(true)),
            Self::Command(_) => None,
        }
    }

    /// Command realising `value`, `None` when nothing has to be sent.
    pub fn encode(&self, value: &Value) -> Result<Option<String>, LutronError> {
        let invalid = || LutronError::InvalidValue {
            device: self.name(),
            value: value.clone(),
        };
        match self {
            Self::Output(spec) => {
                let level = fraction(value).ok_or_else(invalid)?;
                Ok(Some(format!("#OUTPUT,{},1,{:.2}", spec.output, level * 100.0)))
            }
            Self::Sysvar(spec) => {
                let state = integer(value).ok_or_else(invalid)?;
                Ok(Some(format!("#SYSVAR,{},1,{state}", spec.sysvar)))
            }
            Self::Keypad(spec) => Ok(is_truthy(value)
                .then(|| format!("#DEVICE,{},{},{}", spec.keypad, spec.button, spec.action))),
            Self::Command(spec) => Ok(if is_truthy(value) {
                Some(spec.on.clone())
            } else {
                spec.off.clone()
            }),
        }
    }
}

fn fraction(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(on) => Some(if *on { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(on) => Some(i64::from(*on)),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> DeviceSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn should_parse_every_device_kind() {
        assert_eq!(spec(json!({ "output": 12 })), DeviceSpec::Output(OutputSpec { output: 12 }));
        assert_eq!(spec(json!({ "sysvar": 4 })), DeviceSpec::Sysvar(SysvarSpec { sysvar: 4 }));
        assert_eq!(
            spec(json!({ "keypad": 3, "button": 1 })),
            DeviceSpec::Keypad(KeypadSpec {
                keypad: 3,
                button: 1,
                action: PRESS,
            })
        );
        assert_eq!(
            spec(json!({ "on": "#DEVICE,3,1,9,1" })),
            DeviceSpec::Command(CommandSpec {
                on: "#DEVICE,3,1,9,1".to_string(),
                off: None,
            })
        );
    }

    #[test]
    fn should_reject_ambiguous_spec() {
        let parsed: Result<DeviceSpec, _> = serde_json::from_value(json!({ "output": 12, "sysvar": 4 }));
        assert!(parsed.is_err());
        let parsed: Result<DeviceSpec, _> = serde_json::from_value(json!({ "button": 1 }));
        assert!(parsed.is_err());
    }

    #[test]
    fn should_name_devices() {
        assert_eq!(spec(json!({ "output": 12 })).name(), "LutronDevice<12>");
        assert_eq!(spec(json!({ "keypad": 3, "button": 1 })).name(), "LutronKeypad<3, 1, 3>");
        assert_eq!(
            spec(json!({ "on": "A", "off": "B" })).name(),
            "LutronCommand<A, B>"
        );
    }

    fn captured(device: &DeviceSpec, line: &str) -> Option<String> {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let sink = std::sync::Arc::clone(&seen);
        let root = relayhub_kernel::FilterNode::root();
        root.filter(&device.event_pattern().unwrap())
            .unwrap()
            .on_match(move |_, captured| {
                *sink.lock().unwrap() = Some(captured.to_string());
                Ok(())
            });
        root.dispatch(line);
        seen.lock().unwrap().take()
    }

    #[test]
    fn should_build_event_patterns() {
        let keypad = spec(json!({ "keypad": 3, "button": 1 }));
        assert!(captured(&keypad, "~DEVICE,3,1,3").is_some());
        assert!(captured(&keypad, "~DEVICE,3,1,4").is_none());
        assert!(captured(&keypad, "~DEVICE,3,10,3").is_none());
        assert!(captured(&keypad, "~DEVICE,3,1,30").is_none());

        let output = spec(json!({ "output": 12 }));
        assert_eq!(captured(&output, "~OUTPUT,12,1,75.00").as_deref(), Some("75.00"));
        assert!(captured(&output, "~OUTPUT,120,1,75.00").is_none());

        assert_eq!(spec(json!({ "on": "A" })).event_pattern(), None);
    }

    #[test]
    fn should_decode_events() {
        assert_eq!(spec(json!({ "output": 12 })).decode("75.00"), Some(json!(0.75)));
        assert_eq!(spec(json!({ "output": 12 })).decode("100"), Some(json!(1.0)));
        assert_eq!(spec(json!({ "sysvar": 4 })).decode("2"), Some(json!(2)));
        assert_eq!(spec(json!({ "keypad": 3, "button": 1 })).decode("~DEVICE,3,1,3"), Some(json!(true)));
    }

    #[test]
    fn should_encode_commands() {
        let output = spec(json!({ "output": 12 }));
        assert_eq!(output.encode(&json!(0.5)).unwrap().unwrap(), "#OUTPUT,12,1,50.00");
        assert_eq!(output.encode(&json!(true)).unwrap().unwrap(), "#OUTPUT,12,1,100.00");
        assert!(matches!(
            output.encode(&json!("dim")),
            Err(LutronError::InvalidValue { .. })
        ));

        let sysvar = spec(json!({ "sysvar": 4 }));
        assert_eq!(sysvar.encode(&json!(2.0)).unwrap().unwrap(), "#SYSVAR,4,1,2");

        let keypad = spec(json!({ "keypad": 3, "button": 1, "action": 4 }));
        assert_eq!(keypad.encode(&json!(true)).unwrap().unwrap(), "#DEVICE,3,1,4");
        assert_eq!(keypad.encode(&json!(false)).unwrap(), None);

        let toggle = spec(json!({ "on": "A", "off": "B" }));
        assert_eq!(toggle.encode(&json!(1)).unwrap().unwrap(), "A");
        assert_eq!(toggle.encode(&json!(0)).unwrap().unwrap(), "B");
        assert_eq!(spec(json!({ "on": "A" })).encode(&json!(0)).unwrap(), None);
    }
}
