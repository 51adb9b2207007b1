//! Status translator.
//!
//! Classifies a backend response as a usable JSON object or a close frame.
//!
//! | backend answer                         | outcome                         |
//! |----------------------------------------|---------------------------------|
//! | 200 + JSON object body                 | `Ok(object)`                    |
//! | 400, 401, 404, 410, 500, 503           | close `4000 + status`           |
//! | any other status                       | close `4500`                    |
//! | 200 + anything but a JSON object       | close `4500`                    |

use axum::http::StatusCode;
use serde_json::Value;

use crate::chat::backend::BackendResponse;
use crate::chat::envelope::JsonObject;
use crate::chat::error::{ChatError, CloseReason, BACKEND_ERROR};

/// Backend statuses clients may tell apart; each maps to `4000 + status`.
pub const EXPOSED_STATUSES: [u16; 6] = [400, 401, 404, 410, 500, 503];

/// Close frame for a non-200 backend status.
pub fn status_close_reason(status: u16) -> CloseReason {
    if EXPOSED_STATUSES.contains(&status) {
        CloseReason::new(4000 + status, BACKEND_ERROR)
    } else {
        CloseReason::INTERNAL
    }
}

/// Classify a backend response.
pub fn translate(response: &BackendResponse) -> Result<JsonObject, ChatError> {
    if response.status != StatusCode::OK {
        return Err(ChatError::BackendStatus(response.status.as_u16()));
    }
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(ChatError::BackendSchema(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(ChatError::BackendSchema(format!("invalid JSON: {e}"))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
