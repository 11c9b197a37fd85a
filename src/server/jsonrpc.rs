//! JSON-RPC 2.0 envelope types.
//!
//! Shared by both transports. Responses carry either `result` or `error`,
//! never both; the `id` is echoed verbatim (and is `null` for parse
//! errors, where no id could be read).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol version string echoed from `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Parse error: invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error (tool execution failure).
pub const INTERNAL_ERROR: i64 = -32603;

/// An incoming request (or notification, when `id` is absent).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker; tolerated when absent.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Request identifier; notifications omit it.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// A response error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Short message.
    pub message: String,
    /// Optional detail payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// An outgoing response. Exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed request id (`null` when the request was unparseable).
    pub id: Value,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// A success response.
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }

    /// Compact single-line serialisation for wire framing.
    #[must_use]
    pub fn to_compact_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failure"}}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parses_with_and_without_id() {
        let full: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
                .unwrap_or_else(|_| unreachable!());
        assert_eq!(full.id, Some(json!(1)));
        assert_eq!(full.method, "initialize");
        assert!(full.params.is_null());

        let notification: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap_or_else(|_| unreachable!());
        assert!(notification.id.is_none());
    }

    #[test]
    fn test_success_omits_error() {
        let response = JsonRpcResponse::success(json!(1), json!({"ok": true}));
        let wire = response.to_compact_json();
        assert!(wire.contains("\"result\""));
        assert!(!wire.contains("\"error\""));
        assert!(!wire.contains('\n'));
    }

    #[test]
    fn test_error_omits_result() {
        let response = JsonRpcResponse::error(Value::Null, PARSE_ERROR, "Parse error", None);
        let wire = response.to_compact_json();
        assert!(wire.contains("-32700"));
        assert!(wire.contains("\"id\":null"));
        assert!(!wire.contains("\"result\""));
    }
}
