//! TTL expiry and single-flight behaviour of the cache layer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use evm_multichain_mcp::cache::{CacheKey, CacheLayer, CacheTtls, TtlClass};
use evm_multichain_mcp::error::{ErrorKind, ToolError};
use futures::future::join_all;
use serde_json::{json, Map, Value};

fn ttls() -> CacheTtls {
    CacheTtls {
        short: Duration::from_secs(10),
        metadata: Duration::from_secs(60),
        long: Duration::from_secs(600),
    }
}

fn key(address: &str) -> CacheKey {
    let mut args = Map::new();
    args.insert("address".into(), json!(address));
    CacheKey::new("get_balance", "ethereum", &args)
}

/// A compute that counts invocations and takes `delay` to finish.
fn counted(
    counter: &Arc<AtomicUsize>,
    delay: Duration,
    result: Result<Value, ToolError>,
) -> impl FnOnce() -> futures::future::BoxFuture<'static, Result<Value, ToolError>> {
    let counter = counter.clone();
    move || {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            result
        })
    }
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_their_ttl() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));

    let v1 = cache
        .get_or_compute(key("0xabc"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!(1))))
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(9)).await;
    let v2 = cache
        .get_or_compute(key("0xabc"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!(2))))
        .await
        .unwrap();
    assert_eq!((v1, v2), (json!(1), json!(1)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get(&key("0xabc")).is_none());
    let v3 = cache
        .get_or_compute(key("0xabc"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!(3))))
        .await
        .unwrap();
    assert_eq!(v3, json!(3));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_compute_once() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));

    let calls = (0..16).map(|i| {
        cache.get_or_compute(
            key("0xabc"),
            TtlClass::Metadata,
            counted(&counter, Duration::from_millis(100), Ok(json!({"caller": i}))),
        )
    });
    let results = join_all(calls).await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), json!({"caller": 0}));
    }
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn failures_reach_every_waiter_and_are_not_stored() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));

    let calls = (0..4).map(|_| {
        cache.get_or_compute(
            key("0xdef"),
            TtlClass::Short,
            counted(&counter, Duration::from_millis(50), Err(ToolError::timeout("slow"))),
        )
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap_err().kind, ErrorKind::RpcTimeout);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().entries, 0);

    let ok = cache
        .get_or_compute(key("0xdef"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!("fresh"))))
        .await;
    assert_eq!(ok.unwrap(), json!("fresh"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn uncached_class_always_computes() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        cache
            .get_or_compute(key("0x1"), TtlClass::None, counted(&counter, Duration::ZERO, Ok(json!(null))))
            .await
            .unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(cache.stats().entries, 0);
}

#[tokio::test(start_paused = true)]
async fn sweep_drops_only_expired_entries() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));
    cache
        .get_or_compute(key("0x1"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!(1))))
        .await
        .unwrap();
    cache
        .get_or_compute(key("0x2"), TtlClass::Long, counted(&counter, Duration::ZERO, Ok(json!(2))))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(cache.sweep(), 1);
    assert_eq!(cache.get(&key("0x2")), Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn abandoned_callers_do_not_cancel_the_computation() {
    let cache = CacheLayer::new(ttls());
    let counter = Arc::new(AtomicUsize::new(0));

    let caller = {
        let cache = cache.clone();
        let compute = counted(&counter, Duration::from_secs(5), Ok(json!("slow")));
        tokio::spawn(async move { cache.get_or_compute(key("0xdead"), TtlClass::Short, compute).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(cache.stats().in_flight, 1);

    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cache.get(&key("0xdead")), Some(json!("slow")));
    assert_eq!(cache.stats().in_flight, 0);

    let again = cache
        .get_or_compute(key("0xdead"), TtlClass::Short, counted(&counter, Duration::ZERO, Ok(json!("fresh"))))
        .await
        .unwrap();
    assert_eq!(again, json!("slow"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
