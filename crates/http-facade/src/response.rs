//! Normalized API responses

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Status used for responses that never reached the server.
pub const NETWORK_ERROR_STATUS: u16 = 600;
pub const NETWORK_ERROR_CODE: &str = "NETWORK_ERROR";
pub const TIMEOUT_CODE: &str = "TIMEOUT";

/// Status, parsed body and headers of one exchange. HTTP error statuses are
/// ordinary responses; only transport failures get the 600 sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body, a JSON string for non-JSON bodies, `Null` when empty.
    pub data: Value,
    pub headers: BTreeMap<String, String>,
}

impl ApiResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: BTreeMap::new(),
        }
    }

    pub fn network_error(message: impl Into<String>, code: &str) -> Self {
        Self::new(
            NETWORK_ERROR_STATUS,
            json!({
                "status": false,
                "message": message.into(),
                "code": code,
            }),
        )
    }

    pub fn from_body(status: u16, body: &str, headers: BTreeMap<String, String>) -> Self {
        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        };
        Self {
            status,
            data,
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_network_error(&self) -> bool {
        self.status == NETWORK_ERROR_STATUS
    }

    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// A response together with the wall-clock time the exchange took.
#[derive(Debug, Clone)]
pub struct TimedResponse {
    pub response: ApiResponse,
    pub elapsed: Duration,
}

impl TimedResponse {
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}
