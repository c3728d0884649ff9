//! Declarative hub configuration: services, bindings and sequences.
//!
//! The types deserialize from any serde format; the daemon reads them from
//! TOML:
//!
//! ```toml
//! [services.lutron]
//! host = "10.0.0.2"
//!
//! [[bindings]]
//! source = { service = "lutron", device = { output = 12 }, transforms = ["inverse"] }
//! target = { service = "mqtt", device = { topic = "blinds/1", protocol = "covering" } }
//! ```

use std::collections::BTreeMap;

use relayhub_kernel::duration::{parse_duration, parse_optional_duration};
use relayhub_kernel::{KernelError, Transform, Value, ValueFilter};
use serde::Deserialize;

/// Everything the hub wires at startup.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Service instances keyed by name.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Bindings between device endpoints.
    pub bindings: Vec<BindingConfig>,
    /// Ordered gestures.
    pub sequences: Vec<SequenceConfig>,
}

/// One service instance.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceConfig {
    /// Registry key; defaults to the instance name.
    #[serde(default)]
    pub kind: Option<String>,
    /// Adapter-specific options (every other key of the table).
    #[serde(flatten)]
    pub options: serde_json::Map<String, Value>,
}

impl ServiceConfig {
    /// Registry key for instance `name`.
    #[must_use]
    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}

/// A device of a service, optionally seen through derivations.
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    /// Name of the service owning the device.
    pub service: String,
    /// Adapter-specific device spec.
    #[serde(default)]
    pub device: Value,
    /// Derivations applied in order on top of the device connector.
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

/// Configuration form of [`Transform`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformSpec {
    Inverse,
    Toggle,
    ToJson,
    /// Latch duration; the empty string latches until released.
    Once(String),
    Before(String),
    After(String),
    Filter(Vec<Value>),
    Lookup(Vec<(Value, Value)>),
}

impl TransformSpec {
    /// Resolve durations and build the kernel transform.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Duration`] for an unparsable duration.
    pub fn to_transform(&self) -> Result<Transform, KernelError> {
        Ok(match self {
            Self::Inverse => Transform::Inverse,
            Self::Toggle => Transform::Toggle,
            Self::ToJson => Transform::ToJson,
            Self::Once(interval) => Transform::Once(parse_optional_duration(interval)?),
            Self::Before(time) => Transform::Before(parse_duration(time)?),
            Self::After(time) => Transform::After(parse_duration(time)?),
            Self::Filter(values) => Transform::Filter(ValueFilter::OneOf(values.clone())),
            Self::Lookup(pairs) => Transform::Lookup(pairs.clone()),
        })
    }
}

/// Which way values travel through a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    TwoWay,
    OneWay,
}

/// Connects two endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct BindingConfig {
    pub source: Endpoint,
    pub target: Endpoint,
    #[serde(default)]
    pub direction: Direction,
    /// Only values listed here travel, in both directions.
    #[serde(default)]
    pub filter: Option<Vec<Value>>,
    /// Diagnostic name given to both ends.
    #[serde(default)]
    pub name: Option<String>,
}

impl BindingConfig {
    /// The value filter applied to each direction.
    #[must_use]
    pub fn value_filter(&self) -> ValueFilter {
        self.filter
            .clone()
            .map_or(ValueFilter::Any, ValueFilter::OneOf)
    }
}

/// Stages of an ordered gesture; the last endpoint is commanded on completion.
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    pub stages: Vec<Endpoint>,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn should_parse_empty_config() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert!(config.services.is_empty());
        assert!(config.bindings.is_empty());
        assert!(config.sequences.is_empty());
    }

    #[test]
    fn should_parse_services_with_options() {
        let config: HubConfig = toml::from_str(
            r#"
            [services.mqtt]
            host = "broker.local"
            topics = ["zigbee2mqtt/#"]

            [services.porch]
            kind = "shell"
            listen = "tail -F /var/log/porch"
            "#,
        )
        .unwrap();

        let mqtt = &config.services["mqtt"];
        assert_eq!(mqtt.kind_or("mqtt"), "mqtt");
        assert_eq!(mqtt.options["host"], json!("broker.local"));
        assert_eq!(mqtt.options["topics"], json!(["zigbee2mqtt/#"]));

        let porch = &config.services["porch"];
        assert_eq!(porch.kind_or("porch"), "shell");
        assert!(!porch.options.contains_key("kind"));
    }

    #[test]
    fn should_parse_bindings() {
        let config: HubConfig = toml::from_str(
            r#"
            [[bindings]]
            source = { service = "lutron", device = { output = 12 }, transforms = ["inverse", { once = "2s" }] }
            target = { service = "mqtt", device = { topic = "blinds/1", protocol = "covering" } }
            direction = "one-way"
            filter = [0, 1]
            name = "blinds"

            [[bindings]]
            source = { service = "lutron", device = { sysvar = 3 } }
            target = { service = "shell" }
            "#,
        )
        .unwrap();

        let first = &config.bindings[0];
        assert_eq!(first.source.device, json!({"output": 12}));
        assert_eq!(
            first.source.transforms,
            vec![TransformSpec::Inverse, TransformSpec::Once("2s".to_string())]
        );
        assert_eq!(first.direction, Direction::OneWay);
        assert_eq!(first.filter, Some(vec![json!(0), json!(1)]));
        assert_eq!(first.name.as_deref(), Some("blinds"));

        let second = &config.bindings[1];
        assert_eq!(second.direction, Direction::TwoWay);
        assert_eq!(second.target.device, Value::Null);
        assert!(matches!(second.value_filter(), ValueFilter::Any));
    }

    #[test]
    fn should_parse_every_transform_form() {
        let config: HubConfig = toml::from_str(
            r#"
            [[sequences]]
            name = "goodnight"
            stages = [
                { service = "a", transforms = ["toggle", "to_json", { before = "22:00" }, { after = "07:30" }] },
                { service = "b", transforms = [{ filter = [true] }, { lookup = [["open", 1], ["closed", 0]] }, { once = "" }] },
            ]
            "#,
        )
        .unwrap();

        let stages = &config.sequences[0].stages;
        assert_eq!(
            stages[0].transforms,
            vec![
                TransformSpec::Toggle,
                TransformSpec::ToJson,
                TransformSpec::Before("22:00".to_string()),
                TransformSpec::After("07:30".to_string()),
            ]
        );
        assert_eq!(
            stages[1].transforms,
            vec![
                TransformSpec::Filter(vec![json!(true)]),
                TransformSpec::Lookup(vec![(json!("open"), json!(1)), (json!("closed"), json!(0))]),
                TransformSpec::Once(String::new()),
            ]
        );
    }

    #[test]
    fn should_resolve_durations() {
        assert!(matches!(
            TransformSpec::Once("2s".to_string()).to_transform(),
            Ok(Transform::Once(Some(d))) if d == Duration::from_secs(2)
        ));
        assert!(matches!(
            TransformSpec::Once(String::new()).to_transform(),
            Ok(Transform::Once(None))
        ));
        assert!(matches!(
            TransformSpec::Before("22:00".to_string()).to_transform(),
            Ok(Transform::Before(d)) if d == Duration::from_secs(22 * 3600)
        ));
        assert!(matches!(
            TransformSpec::After("soon".to_string()).to_transform(),
            Err(KernelError::Duration(_))
        ));
    }

    #[test]
    fn should_reject_unknown_transform() {
        let result: Result<HubConfig, _> = toml::from_str(
            r#"
            [[bindings]]
            source = { service = "a", transforms = ["eval"] }
            target = { service = "b" }
            "#,
        );
        assert!(result.is_err());
    }
}
