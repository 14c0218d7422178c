//! Line-delimited MCP over an in-memory stdin/stdout pair.

mod common;

use serde_json::{json, Value};

use evm_multichain_mcp::{config::Config, mcp::stdio, AppState};

use common::{dispatcher, MockConnector, MockRpc, VITALIK};

fn state() -> AppState {
    let connector = MockConnector::default().with("ethereum", MockRpc::new(1));
    AppState::new(Config::default(), dispatcher(connector))
}

async fn exchange(lines: &[String]) -> Vec<Value> {
    let input = lines.join("\n");
    let mut output = Vec::new();
    stdio::serve(input.as_bytes(), &mut output, state()).await.unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn one_response_line_per_request() {
    let responses = exchange(&[
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        String::new(),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "get_balance", "arguments": {"address": VITALIK}}
        })
        .to_string(),
    ])
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert!(responses[0]["result"]["capabilities"].is_object());
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["isError"], false);
    assert_eq!(
        responses[1]["result"]["structuredContent"]["data"]["balance"]["ether"],
        "1.500000000000000000"
    );
}

#[tokio::test]
async fn malformed_lines_get_a_parse_error_and_the_stream_continues() {
    let responses = exchange(&[
        "{not json".to_string(),
        json!({"jsonrpc": "2.0", "id": "p", "method": "ping"}).to_string(),
    ])
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[1]["id"], "p");
    assert_eq!(responses[1]["result"], json!({}));
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let state = state();
    assert!(stdio::handle_line("   ", &state).await.is_none());
}
