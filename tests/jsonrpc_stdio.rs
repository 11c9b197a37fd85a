//! JSON-RPC over the stdio transport, driven through in-memory streams.

mod common;

use std::sync::Arc;

use common::{keyword_embedder, test_config};
use mnemo_rs::memory::MemoryOrchestrator;
use mnemo_rs::search::WebSearchClient;
use mnemo_rs::server::{McpService, stdio};
use mnemo_rs::tools::{ToolExecutor, ToolRegistry};
use serde_json::Value;
use tokio::io::{AsyncReadExt, BufReader};

fn service(dir: &std::path::Path) -> Arc<McpService> {
    let config = test_config(dir, 1000);
    let memory = MemoryOrchestrator::new(keyword_embedder(), &config);
    let executor = Arc::new(ToolExecutor::new(
        memory,
        WebSearchClient::new(&config.web_search),
        false,
    ));
    Arc::new(McpService::new(Arc::new(ToolRegistry::new(executor))))
}

async fn drive(input: &str, dir: &std::path::Path) -> Vec<Value> {
    let reader = BufReader::new(input.as_bytes());
    let (mut out_read, out_write) = tokio::io::duplex(1024 * 1024);

    stdio::run_lines(service(dir), reader, out_write)
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

/// initialize then tools/list: two ordered responses, the first carrying
/// the protocol version, the second the tool names.
#[tokio::test]
async fn initialize_then_tools_list() {
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

/// Every method responds with the same id and result xor error.
#[tokio::test]
async fn responses_echo_id_with_result_xor_error() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"system_info","arguments":{}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":4,"method":"no/such/method"}"#,
        "\n",
    );

    let responses = drive(input, dir.path()).await;
    assert_eq!(responses.len(), 4);
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response["id"], (i as u64) + 1);
        let has_result = response.get("result").is_some();
        let has_error = response.get("error").is_some();
        assert!(has_result ^ has_error);
    }
    assert_eq!(responses[3]["error"]["code"], -32601);
}

/// Malformed lines answer with id null and -32700, and the stream keeps
/// serving afterwards.
#[tokio::test]
async fn parse_error_then_recovery() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let input = concat!(
        "{broken json\n",
        r#"{"jsonrpc":"2.0","id":7,"method":"initialize"}"#,
        "\n",
    );

    let responses = drive(input, dir.path()).await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert_eq!(responses[1]["id"], 7);
    assert!(responses[1]["result"].is_object());
}

/// A tools/call round-trip through the transport executes the tool and
/// wraps the result in the MCP content envelope.
#[tokio::test]
async fn tool_call_round_trip() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add_conversation","arguments":{"user_message":"about the scheduler","assistant_message":"noted"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_memory_context","arguments":{"query":"scheduler"}}}"#,
        "\n",
    );

    let responses = drive(input, dir.path()).await;
    assert_eq!(responses.len(), 2);

    let added: Value = serde_json::from_str(
        responses[0]["result"]["content"][0]["text"].as_str().unwrap_or_default(),
    )
    .unwrap_or_else(|_| unreachable!());
    assert_eq!(added["status"], "success");

    let context: Value = serde_json::from_str(
        responses[1]["result"]["content"][0]["text"].as_str().unwrap_or_default(),
    )
    .unwrap_or_else(|_| unreachable!());
    assert!(context["total_items"].as_u64().is_some_and(|n| n >= 1));
}
