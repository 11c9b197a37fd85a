//! MCP transport layer.
//!
//! Two interchangeable JSON-RPC 2.0 front-ends over one core:
//!
//! ```text
//! stdio (line-delimited)  ─┐
//!                          ├─→ McpService::handle ─→ ToolRegistry
//! HTTP POST (SSE frames)  ─┘
//! ```
//!
//! The transports only frame bytes; every method, error code, and tool
//! result shape comes from [`McpService`].

pub mod http;
pub mod jsonrpc;
pub mod service;
pub mod stdio;

pub use http::{HttpState, router, serve_http};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
pub use service::McpService;
pub use stdio::serve_stdio;
