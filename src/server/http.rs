//! HTTP transport with SSE-framed responses.
//!
//! A single endpoint (`/`) accepts GET (discovery) and POST (JSON-RPC).
//! Every JSON-RPC response body is a Server-Sent-Events frame
//! `event: message\ndata: <compact JSON>\n\n` - even single-shot
//! responses, for interoperability with MCP clients that expect SSE.
//! `notifications/initialized` answers `202 Accepted` with an empty body.
//!
//! Auth accepts the API key from any of three headers (`MCP-API-Key`,
//! `X-API-Key`, `Authorization: Bearer <key>`); with auth required, a
//! missing or wrong key is `401` with a plain JSON body (no JSON-RPC
//! envelope). CORS is permissive.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::Response;
use axum::routing::any;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TransportError;

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR, PROTOCOL_VERSION};
use super::service::McpService;

/// Shared state behind the endpoint.
#[derive(Clone)]
pub struct HttpState {
    service: Arc<McpService>,
    require_auth: bool,
    api_key: Option<String>,
}

impl HttpState {
    /// Creates HTTP state over the shared service.
    #[must_use]
    pub const fn new(service: Arc<McpService>, require_auth: bool, api_key: Option<String>) -> Self {
        Self {
            service,
            require_auth,
            api_key,
        }
    }
}

/// Builds the single-endpoint router.
#[must_use]
pub fn router(state: HttpState) -> Router {
    Router::new().route("/", any(endpoint)).with_state(state)
}

/// Serves the HTTP transport until ctrl-c.
///
/// # Errors
///
/// Returns [`TransportError::Bind`] when the listener cannot bind and
/// [`TransportError::Io`] on serve failure.
pub async fn serve_http(state: HttpState, host: &str, port: u16) -> Result<(), TransportError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "HTTP transport listening");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        signal_token.cancel();
    });

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Extracts the API key from any of the three accepted headers.
fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    for name in ["mcp-api-key", "x-api-key"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            return Some(value.to_string());
        }
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn endpoint(
    State(state): State<HttpState>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    if method == Method::OPTIONS {
        return cors_preflight();
    }

    if state.require_auth {
        let presented = extract_api_key(&headers);
        let authorised = match (&presented, &state.api_key) {
            (Some(presented), Some(expected)) => presented == expected,
            _ => false,
        };
        if !authorised {
            warn!("rejected request without valid API key");
            return plain_json(
                StatusCode::UNAUTHORIZED,
                &json!({
                    "error": "API key required in MCP-API-Key, X-API-Key, or Authorization header"
                }),
            );
        }
    }

    if method == Method::GET {
        // Discovery: who we are and how to talk to us.
        return plain_json(
            StatusCode::OK,
            &json!({
                "name": "mnemo-rs",
                "version": env!("CARGO_PKG_VERSION"),
                "protocolVersion": PROTOCOL_VERSION,
                "transport": "http",
            }),
        );
    }

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return sse_response(&JsonRpcResponse::error(
                serde_json::Value::Null,
                PARSE_ERROR,
                "Parse error",
                Some(json!(e.to_string())),
            ));
        }
    };

    match state.service.handle(request).await {
        Some(response) => sse_response(&response),
        // Notification: acknowledged, no body.
        None => with_cors(
            Response::builder()
                .status(StatusCode::ACCEPTED)
                .body(Body::empty()),
        ),
    }
}

/// Frames a JSON-RPC response as a single SSE message event.
fn sse_response(response: &JsonRpcResponse) -> Response {
    let frame = format!("event: message\ndata: {}\n\n", response.to_compact_json());
    with_cors(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from(frame)),
    )
}

fn plain_json(status: StatusCode, value: &serde_json::Value) -> Response {
    with_cors(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string())),
    )
}

fn cors_preflight() -> Response {
    with_cors(
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Body::empty()),
    )
}

fn with_cors(builder: Result<Response, axum::http::Error>) -> Response {
    let mut response = builder.unwrap_or_else(|_| Response::new(Body::empty()));
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        header::HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        header::HeaderValue::from_static("Content-Type, Authorization, MCP-API-Key, X-API-Key"),
    );
    response
}
