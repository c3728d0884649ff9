//! MQTT adapter error types.

use relayhub_app::ServiceError;
use relayhub_app::exec::ExecError;
use relayhub_kernel::{KernelError, Value};

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// A device names a protocol that is neither built in nor configured.
    #[error("unknown MQTT protocol {0:?}")]
    UnknownProtocol(String),

    /// The value has no entry in the protocol's command table.
    #[error("no MQTT command for value {0}")]
    UnknownCommand(Value),

    /// `mosquitto_pub` failed.
    #[error("failed to publish MQTT message")]
    Publish(#[source] ExecError),

    /// A kernel-level error (bad state pattern, …).
    #[error("kernel error")]
    Kernel(#[source] KernelError),
}

impl MqttError {
    /// Convert into a [`ServiceError`] for propagation across the port
    /// boundary.
    pub fn into_service(self) -> ServiceError {
        match self {
            Self::Kernel(err) => ServiceError::Kernel(err),
            other => ServiceError::adapter(other),
        }
    }
}

impl From<MqttError> for ServiceError {
    fn from(err: MqttError) -> Self {
        err.into_service()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_display_unknown_protocol() {
        let err = MqttError::UnknownProtocol("zwave".to_string());
        assert_eq!(err.to_string(), "unknown MQTT protocol \"zwave\"");
    }

    #[test]
    fn should_display_unknown_command() {
        let err = MqttError::UnknownCommand(json!(0.5));
        assert_eq!(err.to_string(), "no MQTT command for value 0.5");
    }

    #[test]
    fn should_convert_to_adapter_error() {
        let err: ServiceError = MqttError::UnknownProtocol("zwave".to_string()).into();
        assert!(matches!(err, ServiceError::Adapter(_)));
    }

    #[test]
    fn should_convert_kernel_error_back_to_kernel() {
        let err: ServiceError = MqttError::Kernel(KernelError::SequenceTooShort(0)).into();
        assert!(matches!(err, ServiceError::Kernel(_)));
    }
}
