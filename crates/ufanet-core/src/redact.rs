//! Credential masking for anything that reaches a log sink.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Keys whose values never appear in logs. Compared case-insensitively.
pub const SENSITIVE_KEYS: [&str; 4] = ["password", "access", "refresh", "authorization"];

pub const MASK: &str = "***";

pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(key))
}

/// Returns a copy of `value` with every sensitive, non-null entry replaced
/// by [`MASK`], descending through nested objects and arrays.
pub fn mask(value: &Value) -> Value {
    mask_with(value, &[])
}

/// Like [`mask`], additionally hiding `extra` keys. Used for request
/// bodies that carry a credential under a non-standard name.
pub fn mask_with(value: &Value, extra: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let masked = map
                .iter()
                .map(|(key, inner)| {
                    let hidden = is_sensitive(key)
                        || extra.iter().any(|candidate| candidate.eq_ignore_ascii_case(key));
                    let inner = if hidden && !inner.is_null() {
                        Value::String(MASK.to_string())
                    } else {
                        mask_with(inner, extra)
                    };
                    (key.clone(), inner)
                })
                .collect::<Map<String, Value>>();
            Value::Object(masked)
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| mask_with(item, extra)).collect()),
        scalar => scalar.clone(),
    }
}

/// Serializes `value` and masks the result. Values that fail to serialize
/// are logged as `null`.
pub fn masked<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value)
        .map(|v| mask(&v))
        .unwrap_or(Value::Null)
}

/// Display adapter for tracing fields: `body = %Masked(&body)`.
pub struct Masked<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + ?Sized> fmt::Display for Masked<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", masked(self.0))
    }
}
