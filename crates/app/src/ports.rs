//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the binding layer and the outside world.
//! They are defined here (in `app`) so that both the hub and the adapter
//! crates can depend on them without creating circular dependencies.

pub mod service;

pub use service::{Service, parse_device, parse_options};
