//! Errors raised while building and running services and bindings.

use relayhub_kernel::{BoxError, KernelError};

/// Errors surfaced by the binding layer and by adapters at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No factory is registered for this service kind.
    #[error("unknown service kind {0:?}")]
    UnknownKind(String),

    /// An endpoint names a service that was not (successfully) built.
    #[error("unknown service {0:?}")]
    UnknownService(String),

    /// The service options table does not match what the adapter expects.
    #[error("invalid options for service {service:?}")]
    Options {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    /// A device spec does not match what the adapter expects.
    #[error("invalid device spec for service {service:?}")]
    Device {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    /// A kernel construction error (bad pattern, duration, sequence, …).
    #[error("kernel error")]
    Kernel(#[from] KernelError),

    /// An adapter-specific failure.
    #[error("adapter error")]
    Adapter(#[source] BoxError),
}

impl ServiceError {
    /// Wrap any adapter error.
    pub fn adapter(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Adapter(Box::new(err))
    }
}
