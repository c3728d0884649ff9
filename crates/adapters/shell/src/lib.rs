//! # relayhub-adapter-shell
//!
//! Shell adapter: devices backed by plain commands.
//!
//! An optional `listen` command runs for the lifetime of the service; its
//! output lines feed a filter tree. A device observes the first group of its
//! `pattern` and realises commanded values by running its `command` with
//! `{value}` replaced by the shell-quoted text of the value.
//!
//! ```toml
//! [services.shell]
//! listen = "tail -F /var/log/doorbell.log"
//!
//! # endpoints
//! device = { pattern = "ring (\\w+)" }
//! device = { command = "amixer set Master {value}%" }
//! device = { pattern = "^state (.*)$", parse = "json", command = "notify {value}" }
//! ```

use std::sync::Arc;
use std::time::Duration;

use relayhub_app::ServiceError;
use relayhub_app::exec::{self, ExecError, quote};
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_kernel::value::to_text;
use relayhub_kernel::{BoxError, Connector, KernelError, ProcessSource, Value};
use serde::Deserialize;

/// Registry key of this adapter.
pub const KIND: &str = "shell";

/// Placeholder substituted in device commands.
pub const PLACEHOLDER: &str = "{value}";

/// Configuration for the shell integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Long-running command whose output feeds device patterns.
    pub listen: Option<String>,
    /// Seconds to wait before restarting the listener.
    pub backoff_secs: u64,
    /// Shell used for the listener and device commands.
    pub shell: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            listen: None,
            backoff_secs: 5,
            shell: "sh".to_string(),
        }
    }
}

/// How captured text becomes a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parse {
    #[default]
    Text,
    Json,
}

impl Parse {
    fn apply(self, captured: &str) -> Result<Value, serde_json::Error> {
        match self {
            Self::Text => Ok(Value::String(captured.to_string())),
            Self::Json => serde_json::from_str(captured),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceSpec {
    pattern: Option<String>,
    command: Option<String>,
    #[serde(default)]
    parse: Parse,
}

/// Errors specific to the shell adapter.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// A device has neither a pattern nor a command.
    #[error("a shell device needs a pattern or a command")]
    EmptyDevice,

    /// A device has a pattern but the service has no listener.
    #[error("pattern {0:?} needs a listen command on the service")]
    NoListener(String),

    /// The device command failed.
    #[error("device command failed")]
    Command(#[source] ExecError),

    /// A kernel-level error (bad pattern, …).
    #[error("kernel error")]
    Kernel(#[source] KernelError),
}

impl From<ShellError> for ServiceError {
    fn from(err: ShellError) -> Self {
        match err {
            ShellError::Kernel(err) => ServiceError::Kernel(err),
            other => ServiceError::adapter(other),
        }
    }
}

/// Command-backed device integration.
pub struct ShellService {
    name: String,
    shell: String,
    listener: Option<ProcessSource>,
}

impl ShellService {
    #[must_use]
    pub fn new(name: impl Into<String>, config: ShellConfig) -> Self {
        let name = name.into();
        let listener = config.listen.map(|command| {
            tracing::info!(service = %name, command = %command, "creating shell listener");
            ProcessSource::new(command)
                .with_shell(config.shell.clone())
                .with_backoff(Duration::from_secs(config.backoff_secs))
        });
        Self {
            name,
            shell: config.shell,
            listener,
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: ShellConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    /// The listener, if the service has one.
    #[must_use]
    pub fn listener(&self) -> Option<&ProcessSource> {
        self.listener.as_ref()
    }

    fn connector(&self, spec: DeviceSpec) -> Result<Connector, ShellError> {
        let name = match (&spec.pattern, &spec.command) {
            (None, None) => return Err(ShellError::EmptyDevice),
            (Some(pattern), _) => format!("Shell<{pattern}>"),
            (None, Some(command)) => format!("Shell<{command}>"),
        };

        let connector = match spec.command {
            Some(template) => {
                let shell = self.shell.clone();
                Connector::with_action(name, move |value: &Value| run(&shell, &template, value))
            }
            None => Connector::new(name),
        };

        if let Some(pattern) = spec.pattern {
            let listener = self
                .listener
                .as_ref()
                .ok_or_else(|| ShellError::NoListener(pattern.clone()))?;
            let device = connector.clone();
            let parse = spec.parse;
            listener
                .filter(&pattern)
                .map_err(ShellError::Kernel)?
                .on_match(move |_line, captured| {
                    device.set(parse.apply(captured)?, false);
                    Ok(())
                });
        }
        Ok(connector)
    }
}

/// Expand `template` for `value`. The value is shell-quoted, so observed
/// text can never add commands to the script.
#[must_use]
pub fn render(template: &str, value: &Value) -> String {
    template.replace(PLACEHOLDER, &quote(&to_text(value)))
}

fn run(shell: &str, template: &str, value: &Value) -> Result<(), BoxError> {
    let command = render(template, value);
    tracing::info!(command = %command, "running command");
    let output = exec::run_script(shell, &command).map_err(ShellError::Command)?;
    if !output.trim().is_empty() {
        tracing::debug!(command = %command, output = %output.trim(), "command output");
    }
    Ok(())
}

impl Service for ShellService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        let spec: DeviceSpec = parse_device(&self.name, spec)?;
        Ok(self.connector(spec)?)
    }

    fn start(&self) -> Result<(), ServiceError> {
        if let Some(listener) = &self.listener {
            listener.start()?;
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(listener) = &self.listener {
            listener.stop();
        }
    }
}
