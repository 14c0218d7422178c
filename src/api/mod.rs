//! # API Module
//!
//! HTTP surface of the server. Every tool is reachable both through the MCP
//! JSON-RPC endpoint and through a plain REST route.
//!
//! ## Available Endpoints
//!
//! - `GET /api/health` - Liveness, configured networks and cache statistics
//! - `GET /api/networks` - Supported networks
//! - `GET /api/tools` - Tool descriptors with input schemas
//! - `POST /api/tools/:name` - Call a tool; the body is its arguments object
//! - `POST /api/rpc` - MCP JSON-RPC over HTTP

pub mod health;
pub mod rpc;
pub mod tools;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/networks", get(tools::networks_handler))
        .route("/tools", get(tools::list_tools_handler))
        .route("/tools/:name", post(tools::call_tool_handler))
        // JSON-RPC endpoint for MCP tool calls
        .route("/rpc", post(rpc::rpc_handler));

    Router::new()
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
