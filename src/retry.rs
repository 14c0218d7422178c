//! # Retry policy
//!
//! One backoff strategy shared by the connection pool (reconnects) and the
//! tool dispatcher (upstream computes). Only transport-level failures
//! (`ConnectionFailure`, `RPCTimeout`) are retried; everything else is
//! returned to the caller on the first attempt.

use crate::config::Config;
use crate::error::ToolError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Errors that can tell whether another attempt might succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ToolError {
    fn is_retryable(&self) -> bool {
        self.kind.is_transport()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 means a single attempt).
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// 0.0 to 1.0; fraction of the delay that may be shaved off at random.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.retry_max_retries,
            initial_delay_ms: config.retry_initial_delay.as_millis() as u64,
            ..Self::default()
        }
    }

    /// `min(initial * multiplier^attempt, max)`; `attempt` is 0 for the first retry.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }

    /// Base delay with jitter applied: `delay * (1 - jitter_factor * random())`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_factor = self.jitter_factor.clamp(0.0, 1.0);
        if jitter_factor <= 0.0 || base.is_zero() {
            return base;
        }
        let jitter: f64 = rand::thread_rng().gen();
        let ms = base.as_millis() as f64 * (1.0 - jitter_factor * jitter);
        Duration::from_millis(ms.max(1.0) as u64)
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made <= self.max_retries
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// policy is exhausted. The last error is returned unchanged.
pub async fn execute_with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempts = 0u32;
    loop {
        let attempt = attempts;
        attempts = attempts.saturating_add(1);
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || !policy.should_retry(attempts) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                debug!(attempt = attempts, ?delay, error = %err, "retrying after transient failure");
                sleep(delay).await;
            }
        }
    }
}
