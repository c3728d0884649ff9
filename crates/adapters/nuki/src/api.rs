//! Nuki Web API calls, made with `curl`.

use std::sync::Arc;

use relayhub_app::exec;
use relayhub_kernel::Value;

use crate::config::NukiConfig;
use crate::error::NukiError;

/// `state.state` of a locked smartlock.
pub const LOCKED: u64 = 1;

/// Lock actions understood by `/smartlock/{id}/action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Unlock,
    Lock,
}

impl LockAction {
    /// Unlock for a truthy value, lock otherwise.
    #[must_use]
    pub fn for_open(open: bool) -> Self {
        if open { Self::Unlock } else { Self::Lock }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Unlock => 1,
            Self::Lock => 2,
        }
    }
}

/// What enabling or disabling auto-lock amounts to for a smartlock in a
/// given state: the advanced configuration to post back, and the lock
/// action that brings the door in line with the new setting, if any.
///
/// # Errors
///
/// Returns [`NukiError::MissingConfig`] if `smartlock` carries no
/// `advancedConfig` object.
pub fn auto_lock_plan(
    id: &str,
    smartlock: &Value,
    enabled: bool,
) -> Result<(Value, Option<LockAction>), NukiError> {
    let mut config = smartlock
        .get("advancedConfig")
        .filter(|config| config.is_object())
        .cloned()
        .ok_or_else(|| NukiError::MissingConfig(id.to_string()))?;
    if let Some(fields) = config.as_object_mut() {
        fields.insert("autoLock".to_string(), Value::Bool(enabled));
        fields.remove("operationId");
    }

    let locked = smartlock.pointer("/state/state").and_then(Value::as_u64) == Some(LOCKED);
    let action = match (enabled, locked) {
        (true, false) => Some(LockAction::Lock),
        (false, true) => Some(LockAction::Unlock),
        _ => None,
    };
    Ok((config, action))
}

/// Authenticated client for one account.
#[derive(Clone)]
pub struct Api {
    config: Arc<NukiConfig>,
}

impl Api {
    pub fn new(config: Arc<NukiConfig>) -> Self {
        Self { config }
    }

    fn request(&self, url: &str, body: Option<&Value>) -> Result<String, NukiError> {
        let timeout = self.config.timeout_secs.to_string();
        let authorization = format!("Authorization: Bearer {}", self.config.api_key);
        let payload = body.map(Value::to_string);
        let mut args = vec![
            "-sS",
            "-f",
            "--max-time",
            timeout.as_str(),
            "-H",
            authorization.as_str(),
            "-H",
            "Content-Type: application/json",
            url,
        ];
        if let Some(payload) = &payload {
            args.extend(["-X", "POST", "-d", payload.as_str()]);
        }
        tracing::debug!(command = %self.config.redact(&args.join(" ")), "running Nuki command");
        exec::run(&self.config.curl, &args).map_err(NukiError::Request)
    }

    /// Current description of smartlock `id`.
    ///
    /// # Errors
    ///
    /// Returns [`NukiError::Request`] or [`NukiError::Response`].
    pub fn smartlock(&self, id: &str) -> Result<Value, NukiError> {
        let response = self.request(&self.config.smartlock_url(id, ""), None)?;
        serde_json::from_str(&response).map_err(NukiError::Response)
    }

    /// Lock or unlock smartlock `id`.
    ///
    /// # Errors
    ///
    /// Returns [`NukiError::Request`] if the call fails.
    pub fn act(&self, id: &str, action: LockAction) -> Result<(), NukiError> {
        let body = serde_json::json!({ "action": action.code() });
        self.request(&self.config.smartlock_url(id, "/action"), Some(&body))?;
        Ok(())
    }

    /// Switch auto-lock of smartlock `id`, then lock the door when enabling
    /// or unlock it when disabling.
    ///
    /// # Errors
    ///
    /// Returns the first failing call's error.
    pub fn set_auto_lock(&self, id: &str, enabled: bool) -> Result<(), NukiError> {
        let smartlock = self.smartlock(id)?;
        let (config, action) = auto_lock_plan(id, &smartlock, enabled)?;
        self.request(&self.config.smartlock_url(id, "/advanced/config"), Some(&config))?;
        if let Some(action) = action {
            self.act(id, action)?;
        }
        Ok(())
    }
}
