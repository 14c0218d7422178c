// src/api/tools.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::mcp::tools;
use crate::AppState;

/// `POST /api/tools/:name` with the tool arguments as the JSON body. The
/// envelope is returned as-is; only an unknown tool name is an HTTP error.
pub async fn call_tool_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    if tools::find(&name).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": format!("Unknown tool: {}", name)})),
        );
    }
    let args = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let result = state.dispatcher.invoke(&name, args).await;
    (StatusCode::OK, Json(result.to_json()))
}

/// `GET /api/tools`
pub async fn list_tools_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "tools": state.dispatcher.list_tools() }))
}

/// `GET /api/networks`
pub async fn networks_handler(State(state): State<AppState>) -> impl IntoResponse {
    let result = state
        .dispatcher
        .invoke("get_supported_networks", json!({}))
        .await;
    Json(result.to_json())
}
