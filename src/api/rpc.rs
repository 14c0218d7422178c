// src/api/rpc.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::mcp::{
    handler::handle_mcp_request,
    protocol::{error_codes, Request, Response},
};
use crate::AppState;

// Forward JSON-RPC requests over HTTP to the MCP handler
pub async fn rpc_handler(State(state): State<AppState>, Json(req): Json<Request>) -> impl IntoResponse {
    match handle_mcp_request(req, state).await {
        Some(resp) => (StatusCode::OK, Json(resp)),
        None => (
            StatusCode::ACCEPTED,
            Json(Response::error(
                serde_json::Value::Null,
                error_codes::INVALID_REQUEST,
                "Notifications produce no response",
            )),
        ),
    }
}
