//! # relayhub-kernel
//!
//! Reactive binding kernel for the relayhub home automation bridge.
//!
//! ## Responsibilities
//! - **Connectors**: reactive value nodes with change detection, listeners,
//!   side-effect actions and two-way bindings
//! - **Derivations**: map, filter, inverse, toggle, timed latch,
//!   time-of-day gates, JSON codec and lookup tables built on connectors
//! - **Filter trees**: cascading regex dispatch of text lines to callbacks
//! - **Process sources**: supervised shell commands feeding filter trees
//! - **Sequencers**: ordered multi-stage gestures over connectors
//!
//! ## Dependency rule
//! This crate knows nothing about concrete devices, protocols or
//! configuration files. Adapters in other crates turn their events into
//! `(line, captured)` pairs or plain [`Connector::set`] calls.

pub mod connector;
pub mod duration;
pub mod error;
pub mod filter;
mod latch;
pub mod process;
pub mod sequencer;
pub mod transform;
pub mod value;

pub use connector::{Action, Connector, ValueFilter, WeakConnector};
pub use error::{BoxError, KernelError};
pub use filter::{FilterNode, LineCallback};
pub use process::ProcessSource;
pub use sequencer::Sequencer;
pub use transform::{TimeGate, Transform};
pub use value::Value;
