use std::time::Duration;

use serde_json::Value;

use crate::utils::ConnectError;

pub(super) fn opt_bool(key: &str, value: &Value) -> Result<Option<bool>, ConnectError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        _ => Err(ConnectError::option(key, "expected a boolean")),
    }
}

pub(super) fn opt_string(key: &str, value: &Value) -> Result<Option<String>, ConnectError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ConnectError::option(key, "expected a string")),
    }
}

/// Seconds as a JSON number; fractions are allowed, zero and negatives are not.
pub(super) fn opt_seconds(key: &str, value: &Value) -> Result<Option<Duration>, ConnectError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| ConnectError::option(key, "expected a positive number of seconds")),
        _ => Err(ConnectError::option(key, "expected a number of seconds")),
    }
}
