//! Service port: lifecycle and device lookup for device integrations.
//!
//! A service bridges one external system (an MQTT broker, a Lutron main
//! repeater, a Bond bridge, a shell command) into the kernel. It hands out
//! [`Connector`]s for the devices named in the configuration and keeps the
//! underlying streams running between [`start`](Service::start) and
//! [`stop`](Service::stop).

use relayhub_kernel::{Connector, Value};
use serde::de::DeserializeOwned;

use crate::error::ServiceError;

/// A pluggable device integration.
///
/// Implementations live in adapter crates. The hub calls the lifecycle
/// methods in order:
///
/// 1. [`device`](Self::device) for every endpoint that names the service
/// 2. [`start`](Self::start) once all bindings are wired
/// 3. [`stop`](Self::stop) on shutdown
pub trait Service: Send + Sync {
    /// Instance name, the key of the service table in the configuration.
    fn name(&self) -> &str;

    /// Registry key of the adapter (e.g. `"mqtt"`).
    fn kind(&self) -> &'static str;

    /// Resolve a device spec into a connector.
    ///
    /// Called before [`start`](Self::start); the returned connector only
    /// receives observations once the service runs.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Device`] when `spec` does not describe a
    /// device of this service.
    fn device(&self, spec: &Value) -> Result<Connector, ServiceError>;

    /// Start background streams. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the streams cannot be launched.
    fn start(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Stop background streams; idempotent.
    fn stop(&self) {}
}

/// Deserialize the options table of service `service`.
///
/// A missing table (`null`) deserializes like an empty one, so adapters
/// whose options are all defaulted need no configuration at all.
///
/// # Errors
///
/// Returns [`ServiceError::Options`] on a shape mismatch.
pub fn parse_options<T: DeserializeOwned>(service: &str, options: Value) -> Result<T, ServiceError> {
    let options = match options {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(options).map_err(|source| ServiceError::Options {
        service: service.to_string(),
        source,
    })
}

/// Deserialize a device spec addressed to service `service`.
///
/// # Errors
///
/// Returns [`ServiceError::Device`] on a shape mismatch.
pub fn parse_device<T: DeserializeOwned>(service: &str, spec: &Value) -> Result<T, ServiceError> {
    T::deserialize(spec).map_err(|source| ServiceError::Device {
        service: service.to_string(),
        source,
    })
}
