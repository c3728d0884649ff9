//! Derived connectors.
//!
//! A derivation is a two-way lens over a source connector: source changes
//! flow *forward* into the derived node as observations (`act = false`),
//! commands on the derived node flow *backward* into the source as commands
//! (`act = true`). Transforms are plain functions on values; any real-world
//! side effect stays on the leaf connector's action.
//!
//! A transform that returns `None` suppresses the value instead of emitting
//! a placeholder, so a filtered-out value can never be confused with a legal
//! one.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Timelike;

use crate::connector::{Connector, ValueFilter};
use crate::duration::parse_duration;
use crate::error::{BoxError, KernelError};
use crate::value::{Value, is_truthy, same_value};

type MapFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Typed derivation recipe, the programmatic counterpart of the
/// convenience methods on [`Connector`].
#[derive(Clone)]
pub enum Transform {
    /// One-way forward mapping.
    Map(MapFn),
    /// Two-way identity gated by a filter.
    Filter(ValueFilter),
    /// Logical negation, both ways.
    Inverse,
    /// Truthy pulses flip a retained boolean.
    Toggle,
    /// Time-bounded latch; `None` latches until an explicit falsy input.
    Once(Option<Duration>),
    /// Pass values only while the local time of day is before this offset.
    Before(Duration),
    /// Pass values only once the local time of day reached this offset.
    After(Duration),
    /// Forward encodes to JSON text, reverse decodes.
    ToJson,
    /// Two-way table: forward maps left to right, reverse right to left.
    Lookup(Vec<(Value, Value)>),
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(_) => f.write_str("Map(..)"),
            Self::Filter(filter) => f.debug_tuple("Filter").field(filter).finish(),
            Self::Inverse => f.write_str("Inverse"),
            Self::Toggle => f.write_str("Toggle"),
            Self::Once(interval) => f.debug_tuple("Once").field(interval).finish(),
            Self::Before(time) => f.debug_tuple("Before").field(time).finish(),
            Self::After(time) => f.debug_tuple("After").field(time).finish(),
            Self::ToJson => f.write_str("ToJson"),
            Self::Lookup(pairs) => f.debug_tuple("Lookup").field(pairs).finish(),
        }
    }
}

/// Which side of a time-of-day boundary lets values through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGate {
    /// Open while `now < limit`.
    Before(u64),
    /// Open while `now >= limit`.
    After(u64),
}

impl TimeGate {
    /// Whether the gate is open at `secs` seconds past midnight.
    #[must_use]
    pub fn is_open_at(self, secs: u64) -> bool {
        match self {
            Self::Before(limit) => secs < limit,
            Self::After(limit) => secs >= limit,
        }
    }

    /// Whether the gate is open right now, in local time.
    #[must_use]
    pub fn is_open(self) -> bool {
        let now = chrono::Local::now().time();
        self.is_open_at(u64::from(now.num_seconds_from_midnight()))
    }
}

impl Connector {
    /// Build the derivation described by `transform`.
    ///
    /// # Errors
    ///
    /// Only [`Transform::Once`] can fail, when no tokio runtime is available
    /// to run its timer.
    pub fn derive(&self, transform: &Transform) -> Result<Connector, KernelError> {
        let derived = match transform {
            Transform::Map(map) => {
                let map = Arc::clone(map);
                self.map(move |v| map(v))
            }
            Transform::Filter(filter) => filter_lens(self, filter.clone()),
            Transform::Inverse => self.inverse(),
            Transform::Toggle => self.toggle(),
            Transform::Once(interval) => self.once(*interval)?,
            Transform::Before(time) => time_gate(self, TimeGate::Before(time.as_secs())),
            Transform::After(time) => time_gate(self, TimeGate::After(time.as_secs())),
            Transform::ToJson => self.to_json(),
            Transform::Lookup(pairs) => self.lookup(pairs.clone()),
        };
        Ok(derived)
    }

    /// One-way mapping; commanding the result does not reach the source.
    #[must_use]
    pub fn map<F>(&self, map: F) -> Connector
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        lens(
            self,
            format!("Map({})", self.name()),
            move |v| Some(map(v)),
            None::<fn(&Value) -> Option<Value>>,
        )
    }

    /// Two-way identity that only lets values accepted by `predicate` through.
    #[must_use]
    pub fn filter<F>(&self, predicate: F) -> Connector
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        filter_lens(self, ValueFilter::predicate(predicate))
    }

    /// Logical negation, both ways.
    #[must_use]
    pub fn inverse(&self) -> Connector {
        lens(
            self,
            format!("Inverse({})", self.name()),
            |v| Some(Value::Bool(!is_truthy(v))),
            Some(|v: &Value| Some(Value::Bool(!is_truthy(v)))),
        )
    }

    /// Flip a retained boolean on every truthy pulse of the source.
    ///
    /// Commanding the toggle pushes the *opposite* value to the source, so
    /// the next physical pulse flips it back in the expected direction.
    #[must_use]
    pub fn toggle(&self) -> Connector {
        toggle(self)
    }

    /// Latch `true` for `interval` after a truthy pulse. Further pulses
    /// while latched neither extend nor restart the window; a falsy input
    /// cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::NoRuntime`] outside a tokio runtime.
    pub fn once(&self, interval: Option<Duration>) -> Result<Connector, KernelError> {
        crate::latch::once(self, interval)
    }

    /// Pass values both ways only before `time` of day (e.g. `"22:00"`).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Duration`] if `time` does not parse.
    pub fn before(&self, time: &str) -> Result<Connector, KernelError> {
        let limit = parse_duration(time)?;
        Ok(time_gate(self, TimeGate::Before(limit.as_secs())))
    }

    /// Pass values both ways only from `time` of day onwards.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Duration`] if `time` does not parse.
    pub fn after(&self, time: &str) -> Result<Connector, KernelError> {
        let limit = parse_duration(time)?;
        Ok(time_gate(self, TimeGate::After(limit.as_secs())))
    }

    /// Encode to JSON text forward, decode on the way back.
    #[must_use]
    pub fn to_json(&self) -> Connector {
        lens(
            self,
            format!("Json({})", self.name()),
            |v| Some(Value::String(v.to_string())),
            Some(decode_json),
        )
    }

    /// Two-way translation table.
    #[must_use]
    pub fn lookup(&self, pairs: Vec<(Value, Value)>) -> Connector {
        let forward = Arc::new(pairs);
        let reverse = Arc::clone(&forward);
        lens(
            self,
            format!("Lookup({})", self.name()),
            move |v| lookup(forward.iter().map(|(a, b)| (a, b)), v),
            Some(move |v: &Value| lookup(reverse.iter().map(|(a, b)| (b, a)), v)),
        )
    }
}

fn filter_lens(source: &Connector, filter: ValueFilter) -> Connector {
    let reverse = filter.clone();
    lens(
        source,
        format!("Filter({})", source.name()),
        move |v| filter.admits(v).then(|| v.clone()),
        Some(move |v: &Value| reverse.admits(v).then(|| v.clone())),
    )
}

/// Wire a stateless lens over `source`.
///
/// The derived node starts from the source's current value, if any.
pub(crate) fn lens<F, R>(source: &Connector, name: String, forward: F, reverse: Option<R>) -> Connector
where
    F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    R: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    let derived = Connector::new(name);
    derived.retain(source);

    if let Some(reverse) = reverse {
        let upstream = source.clone();
        derived.set_action(move |value: &Value| -> Result<(), BoxError> {
            if let Some(back) = reverse(value) {
                upstream.set(back, true);
            }
            Ok(())
        });
    }

    if let Some(seed) = source.get().as_ref().and_then(&forward) {
        derived.set(seed, false);
    }

    let weak = derived.downgrade();
    source.on_set(move |value| {
        if let Some(derived) = weak.upgrade() {
            if let Some(next) = forward(value) {
                derived.set(next, false);
            }
        }
    });

    derived
}

fn toggle(source: &Connector) -> Connector {
    let derived = Connector::new(format!("Toggle({})", source.name()));
    derived.retain(source);
    let state = Arc::new(Mutex::new(false));

    let upstream = source.clone();
    let commanded = Arc::clone(&state);
    derived.set_action(move |value: &Value| -> Result<(), BoxError> {
        let on = is_truthy(value);
        *commanded.lock().unwrap_or_else(PoisonError::into_inner) = on;
        upstream.set(Value::Bool(!on), true);
        Ok(())
    });

    let weak = derived.downgrade();
    source.on_set(move |value| {
        if !is_truthy(value) {
            return;
        }
        let Some(derived) = weak.upgrade() else {
            return;
        };
        let flipped = {
            let mut on = state.lock().unwrap_or_else(PoisonError::into_inner);
            *on = !*on;
            *on
        };
        derived.set(Value::Bool(flipped), false);
    });

    derived
}

fn time_gate(source: &Connector, gate: TimeGate) -> Connector {
    let name = match gate {
        TimeGate::Before(limit) => format!("Before({}, {limit}s)", source.name()),
        TimeGate::After(limit) => format!("After({}, {limit}s)", source.name()),
    };
    lens(
        source,
        name,
        move |v| gate.is_open().then(|| v.clone()),
        Some(move |v: &Value| gate.is_open().then(|| v.clone())),
    )
}

fn decode_json(value: &Value) -> Option<Value> {
    let Value::String(text) = value else {
        tracing::warn!(%value, "expected JSON text, ignoring");
        return None;
    };
    match serde_json::from_str(text) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            tracing::warn!(%err, text = %text, "undecodable JSON text, ignoring");
            None
        }
    }
}

fn lookup<'a>(mut pairs: impl Iterator<Item = (&'a Value, &'a Value)>, value: &Value) -> Option<Value> {
    let found = pairs
        .find(|(from, _)| same_value(from, value))
        .map(|(_, to)| to.clone());
    if found.is_none() {
        tracing::debug!(%value, "no lookup entry, value suppressed");
    }
    found
}
