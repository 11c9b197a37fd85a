//! Line-delimited stdio transport.
//!
//! One JSON object per input line, one per output line, no
//! pretty-printing. Parse errors answer with `id: null` and `-32700`.
//! Responses are written in request order; EOF on stdin ends the server.
//!
//! All logging goes to stderr - stdout belongs to the protocol.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::error::TransportError;

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use super::service::McpService;

/// Serves MCP over the process's stdin/stdout until EOF.
///
/// # Errors
///
/// Returns [`TransportError`] on I/O failure.
pub async fn serve_stdio(service: Arc<McpService>) -> Result<(), TransportError> {
    info!("stdio transport ready");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run_lines(service, stdin, stdout).await
}

/// The transport loop over arbitrary streams (tests drive this with
/// in-memory duplexes).
///
/// # Errors
///
/// Returns [`TransportError`] on I/O failure.
pub async fn run_lines<R, W>(
    service: Arc<McpService>,
    mut reader: R,
    mut writer: W,
) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            info!("stdin closed, shutting down");
            return Ok(());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(request) => service.handle(request).await,
            Err(e) => {
                debug!(error = %e, "unparseable request line");
                Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    PARSE_ERROR,
                    "Parse error",
                    Some(serde_json::json!(e.to_string())),
                ))
            }
        };

        if let Some(response) = response {
            writer.write_all(response.to_compact_json().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, WebSearchConfig};
    use crate::embedding::{Embedder, ModelInfo, PromptKind};
    use crate::memory::MemoryOrchestrator;
    use crate::search::WebSearchClient;
    use crate::tools::{ToolExecutor, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::io::AsyncReadExt;

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str, _kind: PromptKind) -> Vec<f32> {
            crate::embedding::backends::random_embedding(text, 8)
        }

        async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text, PromptKind::Passage).await);
            }
            out
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                backend: "stub".to_string(),
                model_name: "stub".to_string(),
                dim: 8,
                device: None,
                cache_size: 0,
            }
        }
    }

    fn service(dir: &std::path::Path) -> Arc<McpService> {
        let config = Config {
            data_dir: dir.to_path_buf(),
            server: crate::config::ServerConfig {
                require_auth: false,
                ..crate::config::ServerConfig::default()
            },
            ..Config::default()
        };
        let memory = MemoryOrchestrator::new(Arc::new(StubEmbedder), &config);
        let executor = Arc::new(ToolExecutor::new(
            memory,
            WebSearchClient::new(&WebSearchConfig::default()),
            false,
        ));
        Arc::new(McpService::new(Arc::new(ToolRegistry::new(executor))))
    }

    /// Runs the loop over the given input, returning output lines.
    async fn drive(input: &str, dir: &std::path::Path) -> Vec<Value> {
        let service = service(dir);
        let reader = BufReader::new(input.as_bytes());
        let (mut out_read, out_write) = tokio::io::duplex(1024 * 1024);

        run_lines(service, reader, out_write)
            .await
            .unwrap_or_else(|_| unreachable!());

        let mut output = String::new();
        out_read
            .read_to_string(&mut output)
            .await
            .unwrap_or_else(|_| unreachable!());
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap_or_else(|_| unreachable!()))
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_then_tools_list() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );

        let responses = drive(input, dir.path()).await;
        assert_eq!(responses.len(), 2);

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");

        assert_eq!(responses[1]["id"], 2);
        let names: Vec<&str> = responses[1]["result"]["tools"]
            .as_array()
            .map(|tools| tools.iter().filter_map(|t| t["name"].as_str()).collect())
            .unwrap_or_default();
        assert!(names.contains(&"get_memory_context"));
        assert!(names.contains(&"add_conversation"));
    }

    #[tokio::test]
    async fn test_parse_error_answers_null_id() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let responses = drive("this is not json\n", dir.path()).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_notification_writes_nothing() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            "\n",
        );
        let responses = drive(input, dir.path()).await;
        // Only the initialize round-trip produced output.
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_responses_arrive_in_request_order() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let input = (1..=5)
            .map(|i| format!(r#"{{"jsonrpc":"2.0","id":{i},"method":"tools/list"}}"#))
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";

        let responses = drive(&input, dir.path()).await;
        let ids: Vec<u64> = responses.iter().filter_map(|r| r["id"].as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let input = "\n\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"initialize\"}\n\n";
        let responses = drive(input, dir.path()).await;
        assert_eq!(responses.len(), 1);
    }
}
