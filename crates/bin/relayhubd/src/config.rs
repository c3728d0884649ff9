//! Configuration loading: TOML file with environment variable overrides.
//!
//! The file is `relayhub.toml` in the working directory unless the first
//! command line argument or `RELAYHUB_CONFIG` names another one. Every
//! field has a default, so a missing file yields a hub with nothing wired.

use std::path::{Path, PathBuf};

use relayhub_app::HubConfig;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Default configuration file name.
pub const DEFAULT_PATH: &str = "relayhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Services, bindings and sequences.
    #[serde(flatten)]
    pub hub: HubConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "relayhubd=info,relayhub=info".to_string(),
        }
    }
}

/// Pick the configuration file: explicit argument, then environment, then
/// the default name.
#[must_use]
pub fn resolve_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.or(env)
        .filter(|path| !path.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_PATH), PathBuf::from)
}

impl Config {
    /// Load configuration from `path` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is
    /// malformed, or if the resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Parse a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RELAYHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        EnvFilter::try_new(&self.logging.filter).map_err(|err| {
            ConfigError::Validation(format!("invalid logging filter {:?}: {err}", self.logging.filter))
        })?;
        for (index, binding) in self.hub.bindings.iter().enumerate() {
            if binding.source.service.is_empty() || binding.target.service.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "binding #{index} needs a source and a target service"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayhub_app::{Direction, TransformSpec};

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.logging.filter, "relayhubd=info,relayhub=info");
        assert!(config.hub.services.is_empty());
        assert!(config.hub.bindings.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config = Config::parse("").unwrap();
        assert!(config.hub.sequences.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = r#"
            [logging]
            filter = "debug"

            [services.lutron]
            host = "10.0.0.2"
            username = "hub"

            [services.broker]
            kind = "mqtt"
            topics = ["blinds/#"]

            [[bindings]]
            source = { service = "lutron", device = { output = 12 }, transforms = ["inverse"] }
            target = { service = "broker", device = { topic = "blinds/1", protocol = "covering" } }
            direction = "one-way"
            filter = [0, 1]
            name = "blinds"

            [[sequences]]
            stages = [
                { service = "lutron", device = { keypad = 3, button = 1 } },
                { service = "lutron", device = { keypad = 3, button = 2 } },
                { service = "lutron", device = { sysvar = 4 } },
            ]
        "#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.hub.services.len(), 2);
        assert_eq!(config.hub.services["broker"].kind_or("broker"), "mqtt");
        assert_eq!(config.hub.services["lutron"].kind_or("lutron"), "lutron");

        let binding = &config.hub.bindings[0];
        assert_eq!(binding.direction, Direction::OneWay);
        assert_eq!(binding.source.transforms, vec![TransformSpec::Inverse]);
        assert_eq!(binding.name.as_deref(), Some("blinds"));
        assert_eq!(config.hub.sequences[0].stages.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file(Path::new("nonexistent-relayhub.toml")).unwrap();
        assert!(config.hub.services.is_empty());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        assert!(matches!(Config::parse("invalid {{{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn should_reject_invalid_logging_filter() {
        let mut config = Config::default();
        config.logging.filter = "relayhub=loud".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_binding_without_service() {
        let toml = r#"
            [[bindings]]
            source = { service = "" }
            target = { service = "shell" }
        "#;
        let config = Config::parse(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_resolve_config_path() {
        assert_eq!(
            resolve_path(Some("a.toml".to_string()), Some("b.toml".to_string())),
            PathBuf::from("a.toml")
        );
        assert_eq!(resolve_path(None, Some("b.toml".to_string())), PathBuf::from("b.toml"));
        assert_eq!(resolve_path(None, None), PathBuf::from(DEFAULT_PATH));
        assert_eq!(resolve_path(Some(String::new()), None), PathBuf::from(DEFAULT_PATH));
    }
}
