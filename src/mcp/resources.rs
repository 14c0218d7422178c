// src/mcp/resources.rs

use futures::future::join_all;
use serde_json::{json, Value};

use crate::mcp::dispatcher::ToolDispatcher;

pub const NETWORKS_URI: &str = "evm://networks";
pub const STATUS_URI: &str = "evm://status";
pub const GAS_TRACKER_URI: &str = "evm://gas-tracker";
pub const LATEST_BLOCKS_URI: &str = "evm://latest-blocks";

/// `resources/list` payload.
pub fn list_resources() -> Vec<Value> {
    [
        (NETWORKS_URI, "Supported networks", "Registry snapshot of every configured network"),
        (STATUS_URI, "Connection status", "Pool health per network plus cache statistics"),
        (GAS_TRACKER_URI, "Gas tracker", "Current gas price on every network"),
        (LATEST_BLOCKS_URI, "Latest blocks", "Latest block header on every network"),
    ]
    .into_iter()
    .map(|(uri, name, description)| {
        json!({
            "uri": uri,
            "name": name,
            "description": description,
            "mimeType": "application/json",
        })
    })
    .collect()
}

/// Run `tool` on every network concurrently; each entry is that network's
/// envelope, so one failing network does not hide the rest.
async fn per_network(dispatcher: &ToolDispatcher, tool: &str, extra: Value) -> Value {
    let names = dispatcher.registry().names();
    let calls = names.iter().map(|name| {
        let mut args = extra.clone();
        args["network"] = json!(name);
        async move { (name.clone(), dispatcher.invoke(tool, args).await.to_json()) }
    });
    let entries: serde_json::Map<String, Value> = join_all(calls).await.into_iter().collect();
    Value::Object(entries)
}

/// Body of a `resources/read`; `None` for an unknown URI.
pub async fn read_resource(dispatcher: &ToolDispatcher, uri: &str) -> Option<Value> {
    let body = match uri {
        NETWORKS_URI => dispatcher.invoke("get_supported_networks", json!({})).await.to_json(),
        STATUS_URI => {
            let registry = dispatcher.registry();
            let limiter = dispatcher.limiter();
            let mut rate_limits = serde_json::Map::new();
            for name in registry.names() {
                let remaining = limiter.tokens_remaining(&name).await;
                rate_limits.insert(
                    name,
                    json!({"tokens_remaining": remaining, "capacity": limiter.capacity()}),
                );
            }
            json!({
                "default_network": registry.default_network(),
                "connections": dispatcher.pool().status(registry.all()),
                "cache": dispatcher.cache().stats(),
                "rate_limits": rate_limits,
            })
        }
        GAS_TRACKER_URI => per_network(dispatcher, "get_gas_price", json!({})).await,
        LATEST_BLOCKS_URI => {
            per_network(dispatcher, "get_block", json!({"block_identifier": "latest"})).await
        }
        _ => return None,
    };
    Some(body)
}
