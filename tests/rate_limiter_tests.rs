//! Per-network token bucket behaviour.

use std::time::Duration;

use evm_multichain_mcp::blockchain::rate_limit::{LimitMode, RateLimitSettings, RateLimiter};
use evm_multichain_mcp::error::ErrorKind;

fn limiter(capacity: u32, refill_per_sec: f64, max_wait_ms: u64, mode: LimitMode) -> RateLimiter {
    RateLimiter::new(RateLimitSettings {
        capacity,
        refill_per_sec,
        max_wait: Duration::from_millis(max_wait_ms),
        mode,
    })
}

#[tokio::test(start_paused = true)]
async fn reject_mode_fails_once_the_burst_is_spent() {
    let limiter = limiter(3, 1.0, 1000, LimitMode::Reject);
    for _ in 0..3 {
        limiter.acquire("ethereum").await.unwrap();
    }
    let err = limiter.acquire("ethereum").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
    assert!(err.message.contains("ethereum"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(limiter.acquire("ethereum").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn buckets_are_independent_per_network() {
    let limiter = limiter(1, 1.0, 0, LimitMode::Reject);
    limiter.acquire("ethereum").await.unwrap();
    assert!(limiter.acquire("ethereum").await.is_err());
    assert!(limiter.acquire("polygon").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn queue_mode_waits_for_a_refill() {
    let limiter = limiter(1, 10.0, 500, LimitMode::Queue);
    limiter.acquire("base").await.unwrap();

    let started = tokio::time::Instant::now();
    let permit = limiter.acquire("base").await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(90), "waited {:?}", elapsed);
    assert!(permit.waited <= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn queue_mode_gives_up_past_the_wait_budget() {
    // One token every two seconds, but callers only wait 100ms.
    let limiter = limiter(1, 0.5, 100, LimitMode::Queue);
    limiter.acquire("optimism").await.unwrap();

    let started = tokio::time::Instant::now();
    let err = limiter.acquire("optimism").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
    assert!(started.elapsed() <= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn tokens_never_exceed_capacity() {
    let limiter = limiter(5, 100.0, 0, LimitMode::Reject);
    limiter.acquire("arbitrum").await.unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(limiter.tokens_remaining("arbitrum").await, 5.0);

    for _ in 0..5 {
        limiter.acquire("arbitrum").await.unwrap();
    }
    let remaining = limiter.tokens_remaining("arbitrum").await;
    assert!((0.0..1.0).contains(&remaining));
}

#[tokio::test(start_paused = true)]
async fn glacial_refill_rates_fail_cleanly() {
    for mode in [LimitMode::Queue, LimitMode::Reject] {
        let limiter = limiter(1, 1e-30, 2000, mode);
        limiter.acquire("gnosis").await.unwrap();
        let err = limiter.acquire("gnosis").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimitExceeded);
    }
}
