//! # relayhub-adapter-nuki
//!
//! Nuki adapter: smart locks driven through the Nuki Web API.
//!
//! Two kinds of write-only devices per lock:
//!
//! - the lock itself: a truthy value unlocks, a falsy one locks;
//! - its auto-lock setting: enabling it also locks an unlocked door,
//!   disabling it also unlocks a locked one.
//!
//! ```toml
//! [services.nuki]
//! api_key = "..."
//!
//! # endpoints
//! device = "17841234"                  # or { lock = "17841234" }
//! device = { autolock = "17841234" }
//! ```
//!
//! The API key is redacted from every logged command.

mod api;
mod config;
mod error;

pub use api::{LOCKED, LockAction, auto_lock_plan};
pub use config::NukiConfig;
pub use error::NukiError;

use std::sync::Arc;

use relayhub_app::ServiceError;
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_kernel::value::is_truthy;
use relayhub_kernel::{BoxError, Connector, Value};
use serde::Deserialize;

use crate::api::Api;

/// Registry key of this adapter.
pub const KIND: &str = "nuki";

/// Smartlock ids are numbers, but TOML users often quote them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LockId {
    Number(u64),
    Text(String),
}

impl LockId {
    fn into_string(self) -> String {
        match self {
            Self::Number(id) => id.to_string(),
            Self::Text(id) => id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LockSpec {
    lock: LockId,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AutoLockSpec {
    autolock: LockId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceSpec {
    Id(LockId),
    Lock(LockSpec),
    AutoLock(AutoLockSpec),
}

/// Nuki Web API integration.
pub struct NukiService {
    name: String,
    api: Api,
}

impl NukiService {
    #[must_use]
    pub fn new(name: impl Into<String>, config: NukiConfig) -> Self {
        let name = name.into();
        tracing::info!(service = %name, base_url = %config.base_url, "creating Nuki service");
        Self {
            name,
            api: Api::new(Arc::new(config)),
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: NukiConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    /// Connector locking (falsy) or unlocking (truthy) smartlock `id`.
    #[must_use]
    pub fn lock(&self, id: &str) -> Connector {
        let api = self.api.clone();
        let lock_id = id.to_string();
        Connector::with_action(format!("NukiDevice<{id}>"), move |value: &Value| -> Result<(), BoxError> {
            let action = LockAction::for_open(is_truthy(value));
            tracing::info!(lock = %lock_id, ?action, "driving door");
            api.act(&lock_id, action)?;
            Ok(())
        })
    }

    /// Connector switching auto-lock of smartlock `id`.
    #[must_use]
    pub fn auto_lock(&self, id: &str) -> Connector {
        let api = self.api.clone();
        let lock_id = id.to_string();
        Connector::with_action(format!("NukiAutoLock<{id}>"), move |value: &Value| -> Result<(), BoxError> {
            let enabled = is_truthy(value);
            tracing::info!(lock = %lock_id, enabled, "switching auto-lock");
            api.set_auto_lock(&lock_id, enabled)?;
            Ok(())
        })
    }
}

impl Service for NukiService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        Ok(match parse_device::<DeviceSpec>(&self.name, spec)? {
            DeviceSpec::Id(id) | DeviceSpec::Lock(LockSpec { lock: id }) => self.lock(&id.into_string()),
            DeviceSpec::AutoLock(AutoLockSpec { autolock: id }) => self.auto_lock(&id.into_string()),
        })
    }
}
