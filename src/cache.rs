//! TTL cache with single-flight computation.
//!
//! Entries are keyed by tool, network and canonical arguments. On a miss the
//! first caller spawns the computation on the runtime and publishes a shared
//! future; concurrent callers for the same key await that future instead of
//! issuing their own upstream calls. Failures are handed to every waiter and
//! never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TtlClass {
    /// Never cached.
    None,
    Short,
    Metadata,
    Long,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub short: Duration,
    pub metadata: Duration,
    pub long: Duration,
}

impl CacheTtls {
    pub fn from_config(config: &Config) -> Self {
        Self {
            short: config.cache_ttl_short,
            metadata: config.cache_ttl_metadata,
            long: config.cache_ttl_long,
        }
    }

    pub fn duration(&self, class: TtlClass) -> Option<Duration> {
        match class {
            TtlClass::None => None,
            TtlClass::Short => Some(self.short),
            TtlClass::Metadata => Some(self.metadata),
            TtlClass::Long => Some(self.long),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tool: String,
    pub network: String,
    pub args: String,
}

impl CacheKey {
    /// Build a key from validated arguments. The `network` argument is
    /// excluded since it is carried separately (already resolved).
    pub fn new(tool: &str, network: &str, args: &Map<String, Value>) -> Self {
        let canonical: Map<String, Value> = args
            .iter()
            .filter(|(k, _)| k.as_str() != "network")
            .map(|(k, v)| (k.clone(), canonical_value(v)))
            .collect();
        Self {
            tool: tool.to_string(),
            network: network.to_string(),
            args: sorted_json(&Value::Object(canonical)),
        }
    }
}

fn is_hex_like(s: &str) -> bool {
    s.len() > 2
        && (s.starts_with("0x") || s.starts_with("0X"))
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn is_ens_like(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    !s.contains(char::is_whitespace) && lower.ends_with(".eth")
}

fn canonical_value(value: &Value) -> Value {
    match value {
        Value::String(s) if is_hex_like(s) || is_ens_like(s) => Value::String(s.to_lowercase()),
        Value::Array(items) => Value::Array(items.iter().map(canonical_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Serialize with object keys in sorted order regardless of map backing.
fn sorted_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), sorted_json(&map[k])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(sorted_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: Instant,
    pub ttl_class: TtlClass,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
}

type SharedCompute = Shared<BoxFuture<'static, Result<Value, ToolError>>>;

/// Removes the in-flight slot when the compute task ends, including by panic.
struct SlotGuard {
    inflight: Arc<DashMap<CacheKey, SharedCompute>>,
    key: CacheKey,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct CacheLayer {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    inflight: Arc<DashMap<CacheKey, SharedCompute>>,
    ttls: CacheTtls,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheLayer {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            ttls,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Fresh value for `key`, if any. Expired entries are dropped on sight.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
        None
    }

    /// Return the cached value or run `compute` exactly once for all
    /// concurrent callers of `key`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        ttl_class: TtlClass,
        compute: F,
    ) -> Result<Value, ToolError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let Some(ttl) = self.ttls.duration(ttl_class) else {
            return join_compute(tokio::spawn(compute())).await;
        };

        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(tool = %key.tool, network = %key.network, "cache hit");
            return Ok(value);
        }

        let shared = match self.inflight.entry(key.clone()) {
            Entry::Occupied(slot) => {
                debug!(tool = %key.tool, network = %key.network, "joining in-flight computation");
                slot.get().clone()
            }
            Entry::Vacant(slot) => {
                // A compute may have stored its value between our lookup and
                // taking the slot.
                if let Some(value) = self.get(&key) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);

                let entries = self.entries.clone();
                let guard = SlotGuard {
                    inflight: self.inflight.clone(),
                    key: key.clone(),
                };
                let fut = compute();
                let handle = tokio::spawn(async move {
                    let guard = guard;
                    let result = fut.await;
                    if let Ok(value) = &result {
                        let created_at = Instant::now();
                        entries.insert(
                            guard.key.clone(),
                            CacheEntry {
                                value: value.clone(),
                                created_at,
                                ttl_class,
                                expires_at: created_at + ttl,
                            },
                        );
                    }
                    result
                });
                let shared = join_compute(handle).boxed().shared();
                slot.insert(shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            in_flight: self.inflight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

async fn join_compute(handle: JoinHandle<Result<Value, ToolError>>) -> Result<Value, ToolError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!("tool computation panicked");
            Err(ToolError::upstream("Internal error while computing the result"))
        }
        Err(_) => Err(ToolError::upstream("Computation was cancelled")),
    }
}
