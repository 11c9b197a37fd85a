//! Transport-independent MCP request handling.
//!
//! Both transports frame bytes around this one method:
//! `handle(JsonRpcRequest) -> Option<JsonRpcResponse>`. A `None` response
//! means the request was a notification (the HTTP transport answers 202,
//! the stdio transport writes nothing).

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::ToolError;
use crate::tools::ToolRegistry;

use super::jsonrpc::{
    INTERNAL_ERROR, INVALID_PARAMS, JsonRpcRequest, JsonRpcResponse, METHOD_NOT_FOUND,
    PROTOCOL_VERSION,
};

/// The shared MCP core behind both transports.
pub struct McpService {
    registry: Arc<ToolRegistry>,
}

impl std::fmt::Debug for McpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpService").finish_non_exhaustive()
    }
}

impl McpService {
    /// Creates the service over a tool registry.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// The tool registry (for listings outside the JSON-RPC surface).
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handles one request. Returns `None` for notifications.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!(method = %request.method, "handling request");

        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "mnemo-rs",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )),
            "notifications/initialized" => {
                info!("client initialised");
                None
            }
            "tools/list" => Some(JsonRpcResponse::success(
                id,
                json!({ "tools": self.registry.list_tools() }),
            )),
            "tools/call" => Some(self.handle_tool_call(id, &request.params).await),
            other => Some(JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                "Method not found",
                Some(json!(format!("Unknown method: {other}"))),
            )),
        }
    }

    async fn handle_tool_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                "Invalid params",
                Some(json!("tools/call requires params.name")),
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match self.registry.execute(name, &arguments).await {
            Ok(result) => JsonRpcResponse::success(id, tool_content(&result)),
            // Client-input problems come back as a structured tool result
            // with a normal response envelope; the client can read the
            // message and suggestion.
            Err(error @ ToolError::InvalidArguments { .. }) => {
                JsonRpcResponse::success(id, tool_content(&ToolRegistry::error_result(&error)))
            }
            // Unknown tools and handler failures are protocol-level errors.
            Err(error) => JsonRpcResponse::error(
                id,
                INTERNAL_ERROR,
                "Tool execution failed",
                Some(json!(error.to_string())),
            ),
        }
    }
}

/// Wraps a tool result in the MCP content envelope.
fn tool_content(result: &Value) -> Value {
    json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string(result).unwrap_or_default(),
        }]
    })
}
