//! # MCP Handler Module
//!
//! JSON-RPC front end of the Model Context Protocol. It answers the protocol
//! methods (`initialize`, `ping`, `tools/*`, `resources/*`) and hands every
//! tool call to the [`ToolDispatcher`](crate::mcp::dispatcher::ToolDispatcher).
//!
//! Tool names may also be used directly as the method (`"method":
//! "get_balance"`); such requests are rewritten into `tools/call`.

use crate::{
    mcp::{
        protocol::{error_codes, Request, Response},
        resources, tools,
    },
    AppState,
};
use serde_json::{json, Value};
use tracing::{debug, info};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

// Helper: produce a result Value that always contains a text content array
// and preserves structured data for JSON-friendly clients.
fn make_texty_result(text: String, payload: Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": payload,
        "isError": is_error,
    })
}

/// This is the main dispatcher for all incoming MCP requests.
pub async fn handle_mcp_request(req: Request, state: AppState) -> Option<Response> {
    info!("Handling MCP request for method: {}", req.method);

    if req.is_notification() {
        debug!(method = %req.method, "notification, no response");
        return None;
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(&req),
        "ping" => Response::success(req.id.clone(), json!({})),
        "tools/list" => handle_tools_list(&req, &state),
        "tools/call" => handle_tool_call(req, state).await,
        "resources/list" => Response::success(
            req.id.clone(),
            json!({ "resources": resources::list_resources() }),
        ),
        "resources/read" => handle_resource_read(req, state).await,
        // Convenience aliases: a tool name used as the method is rewritten
        // into tools/call so both paths share the same logic
        method if tools::find(method).is_some() => {
            let wrapped = Request {
                jsonrpc: req.jsonrpc.clone(),
                id: req.id.clone(),
                method: "tools/call".to_string(),
                params: Some(json!({
                    "name": method,
                    "arguments": req.params.clone().unwrap_or_else(|| json!({}))
                })),
            };
            handle_tool_call(wrapped, state).await
        }
        _ => Response::error(
            req.id,
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", req.method),
        ),
    };

    Some(response)
}

/// Handles a 'tools/call' request. Tool failures are reported inside the
/// result (`isError: true`), not as JSON-RPC errors.
async fn handle_tool_call(req: Request, state: AppState) -> Response {
    let params = match req.params.as_ref() {
        Some(p) => p,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'params' object",
            )
        }
    };

    let tool_name = match params.get("name").and_then(|n| n.as_str()) {
        Some(name) => name,
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'name' field in params",
            )
        }
    };

    if tools::find(tool_name).is_none() {
        return Response::error(
            req.id,
            error_codes::INVALID_PARAMS,
            format!("Unknown tool: {}", tool_name),
        );
    }

    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    let result = state.dispatcher.invoke(tool_name, args).await;
    let envelope = result.to_json();
    let text = serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string());

    Response::success(req.id, make_texty_result(text, envelope, !result.success))
}

async fn handle_resource_read(req: Request, state: AppState) -> Response {
    let uri = match req
        .params
        .as_ref()
        .and_then(|p| p.get("uri"))
        .and_then(|u| u.as_str())
    {
        Some(uri) => uri.to_string(),
        None => {
            return Response::error(
                req.id,
                error_codes::INVALID_PARAMS,
                "Missing 'uri' field in params",
            )
        }
    };

    match resources::read_resource(&state.dispatcher, &uri).await {
        Some(body) => {
            let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
            Response::success(
                req.id,
                json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": text,
                    }]
                }),
            )
        }
        None => Response::error(
            req.id,
            error_codes::INVALID_PARAMS,
            format!("Unknown resource: {}", uri),
        ),
    }
}

fn handle_initialize(req: &Request) -> Response {
    let server_info = json!({
        "name": "evm_multichain_mcp",
        "version": env!("CARGO_PKG_VERSION")
    });
    let capabilities = json!({
        "tools": { "listChanged": false },
        "resources": { "subscribe": false, "listChanged": false }
    });
    let instructions = "Read-only EVM query server covering several networks. Pass `network` \
        (name, alias or chain id) to pick a chain; the default network is used otherwise.";

    Response::success(
        req.id.clone(),
        json!({
            "serverInfo": server_info,
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "instructions": instructions
        }),
    )
}

/// Handles the 'tools/list' request; schemas come from the tool table.
fn handle_tools_list(req: &Request, state: &AppState) -> Response {
    Response::success(
        req.id.clone(),
        json!({ "tools": state.dispatcher.list_tools() }),
    )
}
