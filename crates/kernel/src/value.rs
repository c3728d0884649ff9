//! Values flowing through connectors.
//!
//! Every connector carries a JSON value. This keeps bindings between
//! heterogeneous devices (levels, flags, topic payloads) uniform while still
//! letting adapters deserialize into their own typed structs at the edges.

pub use serde_json::Value;

/// Whether a value counts as a "pulse".
///
/// `null`, `false`, zero, the empty string and empty collections are falsy;
/// everything else is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Equality used for change detection and membership filters.
///
/// Numbers compare by magnitude, so `1` and `1.0` are the same level.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Render a value as plain text: strings unquoted, everything else as JSON.
#[must_use]
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
