//! JSON-RPC 2.0 message types for LSP communication.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Protocol version attached to every outgoing message.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request message.
///
/// Used both for requests this client sends and for requests the server
/// initiates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version, always "2.0".
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Request identifier.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request with the given id.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version, always "2.0".
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Request identifier.
    pub id: RequestId,
    /// Result value (if successful). `Some(Value::Null)` for `"result": null`.
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error object (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 notification message (no response expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version, always "2.0".
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
///
/// Servers do not always fill it in properly: a missing or non-integer
/// `code` reads as `0` and a missing `message` as empty, so the request is
/// still failed with whatever the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    #[serde(default, deserialize_with = "lenient_code")]
    pub code: i64,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Optional additional error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Self::RequestFailed {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Request ID can be a number or string per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

/// Inbound message from the language server, classified by field presence.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Response to one of our requests (carries `result` or `error`).
    Response(JsonRpcResponse),
    /// Server-initiated request (`method` and `id`).
    Request(JsonRpcRequest),
    /// Notification from server (`method` without `id`).
    Notification(JsonRpcNotification),
}

impl InboundMessage {
    /// Classify a decoded JSON value.
    ///
    /// A `result` member wins over `error`, which wins over `method`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the value is not an object, carries
    /// none of `result`, `error`, `method`, or has ill-typed members.
    pub fn classify(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::Protocol("message is not a JSON object".to_string()));
        };

        let is_response = object.contains_key("result") || object.contains_key("error");
        let has_method = object.contains_key("method");
        let has_id = object.get("id").is_some_and(|id| !id.is_null());

        if is_response {
            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| Error::Protocol(format!("invalid response: {e}")))?;
            return Ok(Self::Response(response));
        }

        match (has_method, has_id) {
            (true, true) => serde_json::from_value(value)
                .map(Self::Request)
                .map_err(|e| Error::Protocol(format!("invalid request: {e}"))),
            (true, false) => serde_json::from_value(value)
                .map(Self::Notification)
                .map_err(|e| Error::Protocol(format!("invalid notification: {e}"))),
            (false, _) => Err(Error::Protocol(
                "message has neither result, error nor method".to_string(),
            )),
        }
    }
}

fn lenient_code<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[allow(clippy::cast_possible_truncation)]
    let code = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    };
    Ok(code)
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Deserialize a field that is present, keeping an explicit `null` as
/// `Some(Value::Null)`. Absence is handled by `#[serde(default)]`.
fn present_field<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
