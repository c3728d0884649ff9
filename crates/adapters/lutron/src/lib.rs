//! # relayhub-adapter-lutron
//!
//! Lutron adapter: drives a RadioRA 2 / HomeWorks QS main repeater through
//! its telnet integration protocol.
//!
//! ## How it works
//!
//! A single session logs in, enables monitoring and feeds every event line
//! (`~OUTPUT,…`, `~SYSVAR,…`, `~DEVICE,…`) to a filter tree. Devices hang a
//! leaf on that tree and queue their commands (`#OUTPUT,…`) on the session.
//! Commands issued while the session is down fail with
//! [`LutronError::NotConnected`].
//!
//! Keypad events are pulses: a button press is observed as `true`
//! immediately followed by `false`, so every press notifies listeners.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `relayhub-app` and `relayhub-kernel`.

mod config;
mod device;
mod error;
mod session;

pub use config::LutronConfig;
pub use device::PRESS;
pub use error::LutronError;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relayhub_app::ServiceError;
use relayhub_app::ports::{Service, parse_device, parse_options};
use relayhub_kernel::{BoxError, Connector, FilterNode, KernelError, Value};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::device::DeviceSpec;
use crate::session::{Link, Session};

/// Registry key of this adapter.
pub const KIND: &str = "lutron";

struct Run {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Lutron integration over one telnet session.
pub struct LutronService {
    name: String,
    config: Arc<LutronConfig>,
    root: FilterNode,
    link: Arc<Link>,
    run: Mutex<Option<Run>>,
}

impl LutronService {
    /// Create the service; the session opens with [`Service::start`].
    #[must_use]
    pub fn new(name: impl Into<String>, config: LutronConfig) -> Self {
        let name = name.into();
        tracing::info!(
            service = %name,
            user = %config.username,
            host = %config.host,
            port = config.port,
            "creating Lutron service"
        );
        Self {
            name,
            config: Arc::new(config),
            root: FilterNode::root(),
            link: Arc::new(Link::default()),
            run: Mutex::new(None),
        }
    }

    /// Factory registered under [`KIND`].
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Options`] if the options do not deserialize.
    pub fn factory(name: &str, options: Value) -> Result<Arc<dyn Service>, ServiceError> {
        let config: LutronConfig = parse_options(name, options)?;
        Ok(Arc::new(Self::new(name, config)))
    }

    /// Root of the monitoring filter tree.
    #[must_use]
    pub fn events(&self) -> &FilterNode {
        &self.root
    }

    /// Whether a session is currently logged in.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Send a raw integration command on the current session.
    ///
    /// # Errors
    ///
    /// Returns [`LutronError::NotConnected`] while no session is up.
    pub fn send_command(&self, command: &str) -> Result<(), LutronError> {
        self.link.send(command)
    }

    fn connector(&self, spec: DeviceSpec) -> Result<Connector, LutronError> {
        let link = Arc::clone(&self.link);
        let action_spec = spec.clone();
        let connector = Connector::with_action(spec.name(), move |value: &Value| -> Result<(), BoxError> {
            if let Some(command) = action_spec.encode(value)? {
                link.send(&command)?;
            }
            Ok(())
        });

        if let Some(pattern) = spec.event_pattern() {
            let device = connector.clone();
            let pulse = matches!(spec, DeviceSpec::Keypad(_));
            self.root
                .filter(&pattern)
                .map_err(LutronError::Kernel)?
                .on_match(move |line, captured| {
                    let Some(value) = spec.decode(captured) else {
                        tracing::warn!(device = %device.name(), line, "unreadable event");
                        return Ok(());
                    };
                    device.set(value, false);
                    if pulse {
                        device.set(Value::Bool(false), false);
                    }
                    Ok(())
                });
        }
        Ok(connector)
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<Run>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Service for LutronService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn device(&self, spec: &Value) -> Result<Connector, ServiceError> {
        let spec: DeviceSpec = parse_device(&self.name, spec)?;
        Ok(self.connector(spec)?)
    }

    fn start(&self) -> Result<(), ServiceError> {
        let mut run = self.lock_run();
        if run.is_some() {
            return Ok(());
        }
        let runtime = Handle::try_current().map_err(KernelError::NoRuntime)?;
        let (stop, stopped) = watch::channel(false);
        let session = Session {
            label: self.name.clone(),
            config: Arc::clone(&self.config),
            root: self.root.clone(),
            link: Arc::clone(&self.link),
            stopped,
        };
        tracing::info!(service = %self.name, host = %self.config.host, "starting Lutron listener");
        *run = Some(Run {
            stop,
            task: runtime.spawn(session.run()),
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(run) = self.lock_run().take() {
            tracing::info!(service = %self.name, "stopping Lutron listener");
            run.stop.send_replace(true);
            drop(run.task);
        }
        self.link.detach();
    }
}

impl Drop for LutronService {
    fn drop(&mut self) {
        self.stop();
    }
}
