//! # relayhub-app
//!
//! Binding layer: service port, registry and the hub that wires
//! configuration into kernel connectors.
//!
//! ## Responsibilities
//! - Define the **port trait** adapters implement: [`Service`](ports::Service)
//!   (`name`, `device`, `start`, `stop`)
//! - Keep an explicit [`ServiceRegistry`] of adapter factories, filled by
//!   the composition root
//! - Describe the declarative configuration ([`HubConfig`]: services,
//!   bindings, sequences, transforms)
//! - Build and run a [`Hub`]: resolve endpoints, apply derivations, wire
//!   bindings and sequencers, start and stop services
//! - Offer adapters a small blocking command runner ([`exec`])
//!
//! ## Dependency rule
//! Depends on `relayhub-kernel` only (plus serde for configuration).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod error;
pub mod exec;
pub mod hub;
pub mod ports;
pub mod registry;

pub use config::{BindingConfig, Direction, Endpoint, HubConfig, SequenceConfig, ServiceConfig, TransformSpec};
pub use error::ServiceError;
pub use hub::Hub;
pub use registry::{ServiceFactory, ServiceRegistry};
