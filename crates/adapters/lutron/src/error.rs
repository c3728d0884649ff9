//! Lutron adapter error types.

use relayhub_app::ServiceError;
use relayhub_kernel::{KernelError, Value};

/// Errors specific to the Lutron adapter.
#[derive(Debug, thiserror::Error)]
pub enum LutronError {
    /// A command was issued while no session is established.
    #[error("not connected to the Lutron main repeater")]
    NotConnected,

    /// The repeater did not send a login prompt in time.
    #[error("timed out waiting for the {0} prompt")]
    PromptTimeout(&'static str),

    /// The repeater closed the connection.
    #[error("connection closed by the Lutron main repeater")]
    Closed,

    /// Socket-level failure.
    #[error("Lutron connection error")]
    Io(#[from] std::io::Error),

    /// The value cannot be expressed as a command argument.
    #[error("invalid value {value} for {device}")]
    InvalidValue { device: String, value: Value },

    /// A kernel-level error (bad pattern, no runtime, …).
    #[error("kernel error")]
    Kernel(#[source] KernelError),
}

impl LutronError {
    /// Convert into a [`ServiceError`] for propagation across the port
    /// boundary.
    pub fn into_service(self) -> ServiceError {
        match self {
            Self::Kernel(err) => ServiceError::Kernel(err),
            other => ServiceError::adapter(other),
        }
    }
}

impl From<LutronError> for ServiceError {
    fn from(err: LutronError) -> Self {
        err.into_service()
    }
}
