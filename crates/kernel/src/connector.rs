//! The reactive value node.
//!
//! A [`Connector`] holds the last known value of something in the house (a
//! dimmer level, a blind position, a keypad press) and notifies listeners
//! when it changes. Bindings are just listeners that call `set` on another
//! connector, so a change anywhere ripples through the bound graph.
//!
//! ## Serialisation
//!
//! All mutation and notification for a connector goes through a
//! single-consumer queue. `set` enqueues the request; if no drain is active
//! the caller becomes the drainer and applies queued requests one by one
//! until the queue is empty. Requests arriving while a drain is active
//! (re-entrantly from a listener on the same stack, or concurrently from
//! another task) are applied by that drainer in arrival order. No lock is
//! held while an action or a listener runs, so cyclic bindings cannot
//! deadlock and listeners always see a linear history of values.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use crate::error::BoxError;
use crate::value::{Value, same_value};

/// Side-effect hook run when a connector is *commanded* to a new value.
///
/// Device adapters implement this to push the value to the real world
/// (send a telnet command, publish a topic, run `curl`, …). It runs before
/// listeners are notified and may block the calling context.
pub trait Action: Send + Sync + 'static {
    /// Realise `value` on the device.
    ///
    /// # Errors
    ///
    /// Any failure is logged by the connector; the cached value keeps the
    /// new value regardless.
    fn apply(&self, value: &Value) -> Result<(), BoxError>;
}

impl<F> Action for F
where
    F: Fn(&Value) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn apply(&self, value: &Value) -> Result<(), BoxError> {
        self(value)
    }
}

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;
type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Restricts which notifications reach a listener.
#[derive(Clone, Default)]
pub enum ValueFilter {
    /// Every notification.
    #[default]
    Any,
    /// Only values equal to one of these.
    OneOf(Vec<Value>),
    /// Only values accepted by the predicate.
    Predicate(Predicate),
}

impl ValueFilter {
    /// Build a predicate filter from a closure.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Whether `value` passes the filter.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(values) => values.iter().any(|v| same_value(v, value)),
            Self::Predicate(predicate) => predicate(value),
        }
    }
}

impl From<Vec<Value>> for ValueFilter {
    fn from(values: Vec<Value>) -> Self {
        Self::OneOf(values)
    }
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

struct Registration {
    filter: ValueFilter,
    callback: Listener,
}

struct Pending {
    value: Value,
    act: bool,
}

#[derive(Default)]
struct Slot {
    value: Option<Value>,
    pending: VecDeque<Pending>,
    draining: bool,
}

struct Inner {
    id: uuid::Uuid,
    name: RwLock<String>,
    slot: Mutex<Slot>,
    listeners: RwLock<Vec<Registration>>,
    action: RwLock<Option<Arc<dyn Action>>>,
    /// Source of a derived node, kept alive as long as the node is.
    upstream: Mutex<Option<Connector>>,
}

/// Reactive value node. Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Connector`].
#[derive(Clone)]
pub struct WeakConnector {
    inner: Weak<Inner>,
}

impl WeakConnector {
    /// Recover a strong handle if the connector is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Connector> {
        self.inner.upgrade().map(|inner| Connector { inner })
    }
}

impl Default for Connector {
    fn default() -> Self {
        let id = uuid::Uuid::new_v4();
        Self::build(id, format!("Connector<{}>", &id.simple().to_string()[..8]))
    }
}

impl Connector {
    /// Create a pure state node with no side effect.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(uuid::Uuid::new_v4(), name.into())
    }

    /// Create a node whose commanded changes run `action`.
    #[must_use]
    pub fn with_action(name: impl Into<String>, action: impl Action) -> Self {
        let connector = Self::new(name);
        connector.set_action(action);
        connector
    }

    fn build(id: uuid::Uuid, name: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                name: RwLock::new(name),
                slot: Mutex::new(Slot::default()),
                listeners: RwLock::new(Vec::new()),
                action: RwLock::new(None),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// Install (or replace) the side-effect hook.
    pub fn set_action(&self, action: impl Action) {
        *self
            .inner
            .action
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(action));
    }

    /// Keep `source` alive for as long as this derived node lives.
    pub(crate) fn retain(&self, source: &Connector) {
        *self
            .inner
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(source.clone());
    }

    /// The node this one was derived from, if any.
    #[must_use]
    pub fn upstream(&self) -> Option<Connector> {
        self.inner
            .upstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stable identifier of this node.
    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.inner.id
    }

    /// Diagnostic name.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner
            .name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the diagnostic name.
    pub fn rename(&self, name: impl Into<String>) {
        *self
            .inner
            .name
            .write()
            .unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// Non-owning handle, used by derivations so that an unbound derived
    /// node does not keep itself alive through its source.
    #[must_use]
    pub fn downgrade(&self) -> WeakConnector {
        WeakConnector {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current value, `None` if never set.
    #[must_use]
    pub fn get(&self) -> Option<Value> {
        self.lock_slot().value.clone()
    }

    /// Set a new value.
    ///
    /// Setting the current value again is a no-op, except for the very first
    /// assignment which always notifies. With `act` the side-effect hook
    /// runs before listeners are notified; pass `act = false` for values
    /// *observed* from the device so the hook does not echo them back.
    pub fn set(&self, value: Value, act: bool) {
        {
            let mut slot = self.lock_slot();
            slot.pending.push_back(Pending { value, act });
            if slot.draining {
                return;
            }
            slot.draining = true;
        }
        self.drain();
    }

    /// `set(value, true)`: a change we want the device to perform.
    pub fn command(&self, value: impl Into<Value>) {
        self.set(value.into(), true);
    }

    /// `set(value, false)`: a change the device reported.
    pub fn observe(&self, value: impl Into<Value>) {
        self.set(value.into(), false);
    }

    /// Register a listener for every future change.
    pub fn on_set<F>(&self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_set_if(ValueFilter::Any, callback);
    }

    /// Register a listener for future changes accepted by `filter`.
    pub fn on_set_if<F>(&self, filter: ValueFilter, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                filter,
                callback: Arc::new(callback),
            });
    }

    /// Drive `target` from this node's changes (commanding it).
    pub fn bind_one_way(&self, target: &Connector, filter: ValueFilter) {
        let target = target.clone();
        self.on_set_if(filter, move |value| target.set(value.clone(), true));
    }

    /// Symmetric binding: each side commands the other on change.
    ///
    /// With `name`, both ends are renamed for diagnostics.
    pub fn bind(&self, other: &Connector, name: Option<&str>) {
        if let Some(name) = name {
            self.rename(name);
            other.rename(name);
        }
        self.bind_one_way(other, ValueFilter::Any);
        other.bind_one_way(self, ValueFilter::Any);
    }

    fn drain(&self) {
        let _guard = DrainGuard(self);
        loop {
            let (value, act, previous) = {
                let mut slot = self.lock_slot();
                let Some(Pending { value, act }) = slot.pending.pop_front() else {
                    slot.draining = false;
                    return;
                };
                if slot
                    .value
                    .as_ref()
                    .is_some_and(|current| same_value(current, &value))
                {
                    continue;
                }
                let previous = slot.value.replace(value.clone());
                (value, act, previous)
            };
            self.apply(&value, act, previous.as_ref());
        }
    }

    fn apply(&self, value: &Value, act: bool, previous: Option<&Value>) {
        let name = self.name();
        if act {
            let action = self
                .inner
                .action
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(action) = action {
                if let Err(err) = action.apply(value) {
                    tracing::error!(connector = %name, %value, %err, "action failed");
                }
            }
        }

        tracing::info!(connector = %name, from = ?previous, to = %value, act, "value changed");

        let callbacks: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|registration| registration.filter.admits(value))
            .map(|registration| Arc::clone(&registration.callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the drain if a listener or action unwinds, so the connector
/// keeps accepting values afterwards.
struct DrainGuard<'a>(&'a Connector);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock_slot().draining = false;
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.name())
            .field("value", &self.get())
            .finish_non_exhaustive()
    }
}
