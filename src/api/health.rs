use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.dispatcher.registry();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "default_network": registry.default_network(),
        "networks": registry.names(),
        "cache": state.dispatcher.cache().stats(),
    }))
}
