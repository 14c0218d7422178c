// src/blockchain/rate_limit.rs

use crate::config::Config;
use crate::error::ToolError;
use dashmap::DashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// What to do when a bucket is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitMode {
    /// Wait for a refill, bounded by `max_wait`.
    Queue,
    /// Fail immediately.
    Reject,
}

impl FromStr for LimitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(LimitMode::Queue),
            "reject" => Ok(LimitMode::Reject),
            other => Err(format!("unknown rate limit mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub max_wait: Duration,
    pub mode: LimitMode,
}

impl RateLimitSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.rate_limit_burst,
            refill_per_sec: config.rate_limit_per_second,
            max_wait: config.rate_limit_max_wait,
            mode: config.rate_limit_mode,
        }
    }
}

/// Token bucket for a single network.
#[derive(Debug)]
pub struct RateBucket {
    tokens_remaining: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateBucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            tokens_remaining: capacity as f64,
            capacity: capacity as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens_remaining = (self.tokens_remaining + elapsed * self.refill_rate)
            .clamp(0.0, self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    /// Waits too long to represent saturate at `Duration::MAX`.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens_remaining >= 1.0 {
            self.tokens_remaining -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens_remaining;
            Err(Duration::try_from_secs_f64(missing / self.refill_rate).unwrap_or(Duration::MAX))
        }
    }
}

/// Proof that one outbound call was admitted.
#[derive(Debug, Clone, Copy)]
pub struct Permit {
    pub waited: Duration,
}

/// Per-network token buckets. Buckets never share a lock.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Arc<Mutex<RateBucket>>>>,
    settings: Arc<RateLimitSettings>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    fn bucket(&self, network: &str) -> Arc<Mutex<RateBucket>> {
        self.buckets
            .entry(network.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RateBucket::new(
                    self.settings.capacity,
                    self.settings.refill_per_sec,
                )))
            })
            .clone()
    }

    /// Take one token from `network`'s bucket.
    pub async fn acquire(&self, network: &str) -> Result<Permit, ToolError> {
        let bucket = self.bucket(network);
        let started = Instant::now();
        let deadline = started + self.settings.max_wait;

        loop {
            let wait = {
                let mut state = bucket.lock().await;
                let now = Instant::now();
                match state.try_take(now) {
                    Ok(()) => {
                        return Ok(Permit {
                            waited: now.saturating_duration_since(started),
                        })
                    }
                    Err(wait) => wait,
                }
            };

            if self.settings.mode == LimitMode::Reject {
                warn!(network, "rate limit bucket empty, rejecting call");
                return Err(ToolError::rate_limited(format!(
                    "Rate limit exceeded for network {}",
                    network
                )));
            }
            let ready_at = Instant::now().checked_add(wait);
            if ready_at.map_or(true, |at| at > deadline) {
                warn!(network, ?wait, "rate limit wait would exceed budget");
                return Err(ToolError::rate_limited(format!(
                    "Rate limit exceeded for network {}: no permit within {}ms",
                    network,
                    self.settings.max_wait.as_millis()
                )));
            }
            debug!(network, ?wait, "waiting for rate limit permit");
            sleep(wait).await;
        }
    }

    /// Current token count after refill, for inspection.
    pub async fn tokens_remaining(&self, network: &str) -> f64 {
        let bucket = self.bucket(network);
        let mut state = bucket.lock().await;
        state.refill(Instant::now());
        state.tokens_remaining
    }

    pub fn capacity(&self) -> u32 {
        self.settings.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_stays_within_bounds() {
        let mut bucket = RateBucket::new(3, 1.0);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(bucket.try_take(now).is_ok());
        }
        let wait = bucket.try_take(now).unwrap_err();
        assert!(wait <= Duration::from_secs(1));
        assert!(bucket.tokens_remaining >= 0.0);
        bucket.refill(now + Duration::from_secs(3600));
        assert_eq!(bucket.tokens_remaining, 3.0);
    }

    #[test]
    fn unrepresentable_waits_saturate() {
        let now = Instant::now();
        let mut slow = RateBucket::new(1, 1e-30);
        assert!(slow.try_take(now).is_ok());
        assert_eq!(slow.try_take(now).unwrap_err(), Duration::MAX);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("Queue".parse::<LimitMode>().unwrap(), LimitMode::Queue);
        assert_eq!("reject".parse::<LimitMode>().unwrap(), LimitMode::Reject);
        assert!("drop".parse::<LimitMode>().is_err());
    }
}
