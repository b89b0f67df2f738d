//! Response envelope normalization.
//!
//! The backend wraps every payload as `{"status": 1, "data": ...}` on
//! success or `{"error": "..."}` on failure. `normalize` turns a finished
//! response into either the bare `data` value or a `ClientError`.

use reqwest::StatusCode;
use serde_json::Value;

use super::ClientError;

/// Message used when a response matches neither envelope shape
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Script-style truthiness: `null`, `false`, `0` and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Map a completed (non-transport-failure) response to its payload.
///
/// A 401 short-circuits before the body is looked at.
pub fn normalize(status: StatusCode, body: &[u8]) -> Result<Value, ClientError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let status = status.as_u16();
    let Ok(Value::Object(mut envelope)) = serde_json::from_slice::<Value>(body) else {
        return Err(ClientError::http(UNKNOWN_ERROR, status));
    };

    let ok = envelope.get("status").map(is_truthy).unwrap_or(false);
    if ok {
        if let Some(data) = envelope.remove("data").filter(|d| !d.is_null()) {
            return Ok(data);
        }
    }

    match envelope.remove("error") {
        Some(Value::String(message)) if !message.is_empty() => {
            Err(ClientError::Http { message, status })
        }
        _ => Err(ClientError::http(UNKNOWN_ERROR, status)),
    }
}
