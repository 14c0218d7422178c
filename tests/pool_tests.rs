//! Connection reuse, health marking and reconnection.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use evm_multichain_mcp::blockchain::pool::{ConnectionPool, PoolSettings};
use evm_multichain_mcp::error::{ErrorKind, ToolError};

use common::{fast_retry, registry, MockConnector, MockRpc};

fn pool(connector: MockConnector) -> ConnectionPool {
    ConnectionPool::new(
        Arc::new(connector),
        PoolSettings {
            stale_after: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(1),
            max_reconnect_attempts: 3,
            retry: fast_retry(),
        },
    )
}

fn state_of(pool: &ConnectionPool, network: &str) -> &'static str {
    let config = registry().resolve(network).unwrap().clone();
    pool.status(&[config])[0].state
}

#[tokio::test(start_paused = true)]
async fn healthy_handles_are_reused_without_probing() {
    let connector = MockConnector::default().with("ethereum", MockRpc::new(1));
    let pool = pool(connector.clone());
    let ethereum = registry().resolve("ethereum").unwrap().clone();

    pool.acquire(&ethereum).await.unwrap();
    pool.acquire(&ethereum).await.unwrap();
    pool.acquire(&ethereum).await.unwrap();

    // Only the creation probe.
    assert_eq!(connector.rpc("ethereum").calls("block_number"), 1);
    assert_eq!(state_of(&pool, "ethereum"), "connected");
}

#[tokio::test(start_paused = true)]
async fn idle_handles_are_probed_before_reuse() {
    let connector = MockConnector::default().with("ethereum", MockRpc::new(1));
    let pool = pool(connector.clone());
    let ethereum = registry().resolve("ethereum").unwrap().clone();

    pool.acquire(&ethereum).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    pool.acquire(&ethereum).await.unwrap();

    assert_eq!(connector.rpc("ethereum").calls("block_number"), 2);
}

#[tokio::test(start_paused = true)]
async fn unhealthy_handles_are_replaced_once_the_node_recovers() {
    let connector = MockConnector::default().with("polygon", MockRpc::new(137));
    let pool = pool(connector.clone());
    let polygon = registry().resolve("polygon").unwrap().clone();
    let rpc = connector.rpc("polygon");

    pool.acquire(&polygon).await.unwrap();
    rpc.fail_with(Some(ToolError::connection("connection reset")));
    pool.mark_unhealthy("polygon", &ToolError::connection("connection reset"))
        .await;

    let err = pool.acquire(&polygon).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::ConnectionFailure);
    assert!(err.message.contains("3 attempts"));
    assert_eq!(state_of(&pool, "polygon"), "disconnected");

    rpc.fail_with(None);
    assert!(pool.acquire(&polygon).await.is_ok());
    assert_eq!(state_of(&pool, "polygon"), "connected");
}

#[tokio::test(start_paused = true)]
async fn queued_callers_share_a_failed_reconnect() {
    let connector = MockConnector::default().with("arbitrum", MockRpc::unreachable(42161));
    let pool = pool(connector.clone());
    let arbitrum = registry().resolve("arbitrum").unwrap().clone();

    let results = join_all((0..10).map(|_| pool.acquire(&arbitrum))).await;

    for result in &results {
        let err = result.as_ref().err().unwrap();
        assert_eq!(err.kind, ErrorKind::ConnectionFailure);
        assert!(err.message.contains("3 attempts"));
    }
    // One round of attempts for all ten callers.
    assert_eq!(connector.rpc("arbitrum").calls("block_number"), 3);

    // A caller arriving after the failure tries again.
    assert!(pool.acquire(&arbitrum).await.is_err());
    assert_eq!(connector.rpc("arbitrum").calls("block_number"), 6);
}

#[tokio::test]
async fn unroutable_networks_report_connection_failure() {
    let pool = pool(MockConnector::default());
    let base = registry().resolve("base").unwrap().clone();

    let err = pool.acquire(&base).await.err().unwrap();
    assert_eq!(err.kind, ErrorKind::ConnectionFailure);
    assert!(err.message.contains("base"));
}

#[tokio::test]
async fn status_reports_one_row_per_network() {
    let connector = MockConnector::default().with("ethereum", MockRpc::new(1));
    let pool = pool(connector);
    let registry = registry();
    let ethereum = registry.resolve("ethereum").unwrap().clone();

    pool.acquire(&ethereum).await.unwrap();
    pool.mark_unhealthy("ethereum", &ToolError::timeout("slow node"))
        .await;

    let rows = pool.status(registry.all());
    assert_eq!(rows.len(), registry.all().len());

    let eth = rows.iter().find(|r| r.network == "ethereum").unwrap();
    assert_eq!(eth.state, "unhealthy");
    assert_eq!(eth.last_error.as_deref(), Some("slow node"));

    let polygon = rows.iter().find(|r| r.network == "polygon").unwrap();
    assert_eq!(polygon.state, "disconnected");
    assert!(polygon.idle_secs.is_none());
}
