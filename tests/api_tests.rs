//! HTTP surface: REST tool routes and MCP JSON-RPC over HTTP.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use evm_multichain_mcp::{api::create_router, config::Config, AppState};

use common::{dispatcher, MockConnector, MockRpc, VITALIK};

fn app() -> Router {
    let connector = MockConnector::default().with("ethereum", MockRpc::new(1));
    create_router(AppState::new(Config::default(), dispatcher(connector)))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
        None => Body::empty(),
    };
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn rpc(body: Value) -> (StatusCode, Value) {
    send(app(), Method::POST, "/api/rpc", Some(body)).await
}

#[tokio::test]
async fn health_lists_networks() {
    let (status, body) = send(app(), Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["default_network"], "ethereum");
    assert_eq!(body["networks"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn tool_route_returns_the_envelope() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/api/tools/get_balance",
        Some(json!({"address": VITALIK})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["balance"]["ether"], "1.500000000000000000");
}

#[tokio::test]
async fn tool_route_reports_tool_failures_in_the_envelope() {
    let (status, body) = send(
        app(),
        Method::POST,
        "/api/tools/get_balance",
        Some(json!({"address": "not-an-address"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "ValidationError");
}

#[tokio::test]
async fn unknown_tool_route_is_not_found() {
    let (status, body) = send(app(), Method::POST, "/api/tools/send_transaction", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn tool_listing_carries_schemas() {
    let (status, body) = send(app(), Method::GET, "/api/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().unwrap();
    let balance = tools.iter().find(|t| t["name"] == "get_balance").unwrap();
    assert_eq!(balance["inputSchema"]["required"], json!(["address"]));
}

#[tokio::test]
async fn rpc_initialize_advertises_capabilities() {
    let (status, body) = rpc(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert!(body["result"]["capabilities"]["tools"].is_object());
    assert!(body["result"]["capabilities"]["resources"].is_object());
    assert_eq!(body["result"]["serverInfo"]["name"], "evm_multichain_mcp");
}

#[tokio::test]
async fn rpc_tools_call_marks_failures_with_is_error() {
    let (_, ok) = rpc(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/call",
        "params": {"name": "get_balance", "arguments": {"address": VITALIK}}
    }))
    .await;
    assert_eq!(ok["result"]["isError"], false);
    assert_eq!(ok["result"]["structuredContent"]["success"], true);

    let (_, failed) = rpc(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {"name": "get_balance", "arguments": {"address": VITALIK, "network": "solana"}}
    }))
    .await;
    assert!(failed.get("error").is_none());
    assert_eq!(failed["result"]["isError"], true);
    assert_eq!(failed["result"]["structuredContent"]["error_kind"], "NetworkUnsupported");
}

#[tokio::test]
async fn rpc_accepts_tool_names_as_methods() {
    let (_, body) = rpc(json!({
        "jsonrpc": "2.0",
        "id": "alias",
        "method": "convert_units",
        "params": {"amount": "1", "from_unit": "ether", "to_unit": "gwei"}
    }))
    .await;
    assert_eq!(body["id"], "alias");
    assert_eq!(body["result"]["structuredContent"]["data"]["converted"]["amount"], "1000000000");
}

#[tokio::test]
async fn rpc_rejects_unknown_methods_and_tools() {
    let (_, method) = rpc(json!({"jsonrpc": "2.0", "id": 4, "method": "wallet/create"})).await;
    assert_eq!(method["error"]["code"], -32601);

    let (_, tool) = rpc(json!({
        "jsonrpc": "2.0",
        "id": 5,
        "method": "tools/call",
        "params": {"name": "send_transaction"}
    }))
    .await;
    assert_eq!(tool["error"]["code"], -32602);
}

#[tokio::test]
async fn rpc_notifications_are_accepted_without_a_result() {
    let (status, body) = rpc(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.get("result").is_none());
}

#[tokio::test]
async fn rpc_reads_the_networks_resource() {
    let (_, body) = rpc(json!({
        "jsonrpc": "2.0",
        "id": 6,
        "method": "resources/read",
        "params": {"uri": "evm://networks"}
    }))
    .await;
    let contents = &body["result"]["contents"][0];
    assert_eq!(contents["uri"], "evm://networks");
    let payload: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["data"]["count"], 10);
}
