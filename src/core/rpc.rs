//! JSON-lines request/response envelopes for `workgate serve`.
//!
//! One request per line on stdin, one response per line on stdout:
//!
//! ```json
//! {"id":"1","op":"evaluate","params":{"kind":"shell-command","text":"ls","cwd":"/repo"}}
//! {"id":"1","success":true,"result":{...}}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    pub op: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Echoed back on the response.
    #[serde(default = "default_request_id")]
    pub id: String,
    /// Escalation session; actions without their own `session_id` use it.
    #[serde(default)]
    pub session: Option<String>,
}

pub fn default_request_id() -> String {
    ulid::Ulid::new().to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcResponse {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    /// Stable machine-readable code, e.g. `invalid_request`, `unknown_op`.
    pub code: String,
    pub message: String,
}

impl RpcResponse {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }
}
