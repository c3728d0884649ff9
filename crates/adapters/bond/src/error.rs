//! Bond adapter error types.

use relayhub_app::ServiceError;
use relayhub_app::exec::ExecError;
use relayhub_kernel::{KernelError, Value};

/// Errors specific to the Bond adapter.
#[derive(Debug, thiserror::Error)]
pub enum BondError {
    /// The value is not a speed level.
    #[error("invalid speed {0}")]
    InvalidSpeed(Value),

    /// The HTTP call to the bridge failed.
    #[error("Bond request failed")]
    Request(#[source] ExecError),

    /// A kernel-level error (bad pattern, …).
    #[error("kernel error")]
    Kernel(#[source] KernelError),
}

impl BondError {
    /// Convert into a [`ServiceError`] for propagation across the port
    /// boundary.
    pub fn into_service(self) -> ServiceError {
        match self {
            Self::Kernel(err) => ServiceError::Kernel(err),
            other => ServiceError::adapter(other),
        }
    }
}

impl From<BondError> for ServiceError {
    fn from(err: BondError) -> Self {
        err.into_service()
    }
}
