//! Small accessors for decoded payloads that turn absent or mistyped
//! fields into [`Error`]s instead of panics.

use serde_json::{Map, Value};

use crate::{Error, Result};

pub fn require<'v>(value: &'v Value, key: &str) -> Result<&'v Value> {
  value.get(key).ok_or_else(|| Error::MissingField(key.to_owned()))
}

pub fn require_str<'v>(value: &'v Value, key: &str) -> Result<&'v str> {
  require(value, key)?.as_str().ok_or_else(|| Error::UnexpectedShape {
    field:    key.to_owned(),
    expected: "string",
  })
}

pub fn require_array<'v>(value: &'v Value, key: &str) -> Result<&'v Vec<Value>> {
  as_array(require(value, key)?, key)
}

pub fn as_array<'v>(value: &'v Value, field: &str) -> Result<&'v Vec<Value>> {
  value.as_array().ok_or_else(|| Error::UnexpectedShape {
    field:    field.to_owned(),
    expected: "array",
  })
}

pub fn as_object_mut<'v>(value: &'v mut Value, field: &str) -> Result<&'v mut Map<String, Value>> {
  value.as_object_mut().ok_or_else(|| Error::UnexpectedShape {
    field:    field.to_owned(),
    expected: "object",
  })
}

/// Array under `key` if present; an absent section is empty.
pub fn section<'v>(value: &'v Value, key: &str) -> Result<&'v [Value]> {
  match value.get(key) {
    None | Some(Value::Null) => Ok(&[]),
    Some(v) => as_array(v, key).map(Vec::as_slice),
  }
}

/// String form of a scalar: strings as-is, anything else as JSON text.
pub fn text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Non-empty string under `key`.
pub fn non_empty<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
  value.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Whether `key` appears anywhere in `value`, at any depth.
pub fn contains_key_deep(value: &Value, key: &str) -> bool {
  match value {
    Value::Object(map) => map.contains_key(key) || map.values().any(|v| contains_key_deep(v, key)),
    Value::Array(items) => items.iter().any(|v| contains_key_deep(v, key)),
    _ => false,
  }
}
