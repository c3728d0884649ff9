//! Nuki adapter error types.

use relayhub_app::ServiceError;
use relayhub_app::exec::ExecError;

/// Errors specific to the Nuki adapter.
#[derive(Debug, thiserror::Error)]
pub enum NukiError {
    /// The HTTP call to the Web API failed.
    #[error("Nuki request failed")]
    Request(#[source] ExecError),

    /// The Web API answered with something that is not JSON.
    #[error("unreadable Nuki response")]
    Response(#[source] serde_json::Error),

    /// The smartlock description has no advanced configuration.
    #[error("smartlock {0} has no advanced configuration")]
    MissingConfig(String),
}

impl NukiError {
    /// Convert into a [`ServiceError`] for propagation across the port
    /// boundary.
    pub fn into_service(self) -> ServiceError {
        ServiceError::adapter(self)
    }
}

impl From<NukiError> for ServiceError {
    fn from(err: NukiError) -> Self {
        err.into_service()
    }
}
