//! Typed access to tool arguments.

use serde_json::Value;
use zephyr_core::{Arguments, Error, JsonObject, Result};

/// String argument; absent or null gives `None`.
pub(crate) fn optional_str<'a>(args: &'a Arguments, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(Error::InvalidArgument(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

pub(crate) fn required_str<'a>(args: &'a Arguments, key: &str) -> Result<&'a str> {
    optional_str(args, key)?
        .ok_or_else(|| Error::InvalidArgument(format!("'{key}' is required")))
}

/// Boolean argument; absent or null gives `None`.
pub(crate) fn optional_bool(args: &Arguments, key: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(Error::InvalidArgument(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}

/// Unwraps a `json!` object literal.
pub(crate) fn schema_object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}
