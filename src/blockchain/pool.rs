// src/blockchain/pool.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::{Connector, EvmRpc};
use crate::config::Config;
use crate::error::ToolError;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Idle time after which a handle is probed before reuse.
    pub stale_after: Duration,
    pub probe_timeout: Duration,
    /// Consecutive create+probe attempts before giving up.
    pub max_reconnect_attempts: u32,
    pub retry: RetryPolicy,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stale_after: config.pool_stale_after,
            probe_timeout: config.pool_probe_timeout,
            max_reconnect_attempts: config.pool_max_reconnect_attempts.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// The live client for one network, owned by the pool.
pub struct ConnectionHandle {
    pub network_name: String,
    pub client: Arc<dyn EvmRpc>,
    pub healthy: bool,
    pub last_used_at: Instant,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct PoolSlot {
    handle: Option<ConnectionHandle>,
    // Survives handle replacement so status can report the last failure.
    last_error: Option<String>,
    // Error of the last exhausted reconnect, cleared on success.
    failure: Option<ToolError>,
}

#[derive(Default)]
struct PoolEntry {
    /// Bumped every time a reconnect gives up. Read before queueing on the
    /// slot so waiters can tell a failure happened while they waited.
    failures: AtomicU64,
    slot: Mutex<PoolSlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub network: String,
    /// `connected`, `unhealthy`, `disconnected` or `busy`.
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// One lazily created, health-checked client per network.
#[derive(Clone)]
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    slots: Arc<DashMap<String, Arc<PoolEntry>>>,
    settings: Arc<PoolSettings>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, settings: PoolSettings) -> Self {
        Self {
            connector,
            slots: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    fn entry(&self, network: &str) -> Arc<PoolEntry> {
        self.slots.entry(network.to_string()).or_default().clone()
    }

    async fn probe(&self, client: &Arc<dyn EvmRpc>) -> Result<(), ToolError> {
        match timeout(self.settings.probe_timeout, client.block_number()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ToolError::timeout("liveness probe timed out")),
        }
    }

    /// Return the client for `network`, creating or replacing it as needed.
    ///
    /// Callers queued behind a reconnect that gave up receive that same
    /// error instead of starting another round of attempts.
    pub async fn acquire(&self, network: &NetworkConfig) -> Result<Arc<dyn EvmRpc>, ToolError> {
        let entry = self.entry(&network.name);
        let failures_seen = entry.failures.load(Ordering::Acquire);
        let mut slot = entry.slot.lock().await;
        if slot.handle.is_none() && entry.failures.load(Ordering::Acquire) != failures_seen {
            if let Some(failure) = slot.failure.clone() {
                debug!(network = %network.name, "sharing reconnect failure with queued caller");
                return Err(failure);
            }
        }
        let now = Instant::now();

        if let Some(handle) = slot.handle.as_mut() {
            let idle = now.saturating_duration_since(handle.last_used_at);
            if handle.healthy && idle < self.settings.stale_after {
                handle.last_used_at = now;
                return Ok(handle.client.clone());
            }

            debug!(network = %network.name, healthy = handle.healthy, ?idle, "probing pooled connection");
            match self.probe(&handle.client).await {
                Ok(()) => {
                    handle.healthy = true;
                    handle.last_used_at = Instant::now();
                    handle.last_error = None;
                    return Ok(handle.client.clone());
                }
                Err(e) => {
                    warn!(network = %network.name, error = %e, "liveness probe failed, reconnecting");
                    slot.last_error = Some(e.message.clone());
                    slot.handle = None;
                }
            }
        }

        let attempts = self.settings.max_reconnect_attempts;
        let mut last_error = String::from("no attempt made");
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(self.settings.retry.delay_for(attempt - 1)).await;
            }
            let created = match self.connector.connect(network) {
                Ok(client) => self.probe(&client).await.map(|_| client),
                Err(e) => Err(e),
            };
            match created {
                Ok(client) => {
                    info!(network = %network.name, attempt = attempt + 1, "connection established");
                    slot.handle = Some(ConnectionHandle {
                        network_name: network.name.clone(),
                        client: client.clone(),
                        healthy: true,
                        last_used_at: Instant::now(),
                        last_error: None,
                    });
                    slot.last_error = None;
                    slot.failure = None;
                    return Ok(client);
                }
                Err(e) => {
                    warn!(network = %network.name, attempt = attempt + 1, error = %e, "connection attempt failed");
                    last_error = e.message;
                }
            }
        }

        let failure = ToolError::connection(format!(
            "network {} unreachable after {} attempts: {}",
            network.name, attempts, last_error
        ));
        slot.last_error = Some(last_error);
        slot.failure = Some(failure.clone());
        entry.failures.fetch_add(1, Ordering::AcqRel);
        Err(failure)
    }

    /// Flag the handle so the next acquisition probes it first.
    pub async fn mark_unhealthy(&self, network: &str, error: &ToolError) {
        let Some(entry) = self.slots.get(network).map(|e| e.clone()) else {
            return;
        };
        let mut slot = entry.slot.lock().await;
        if let Some(handle) = slot.handle.as_mut() {
            handle.healthy = false;
            handle.last_error = Some(error.message.clone());
        }
        slot.last_error = Some(error.message.clone());
        debug!(network, error = %error, "connection marked unhealthy");
    }

    /// Non-blocking health snapshot, one row per listed network.
    pub fn status(&self, networks: &[NetworkConfig]) -> Vec<ConnectionStatus> {
        let now = Instant::now();
        networks
            .iter()
            .map(|network| {
                let entry = self.slots.get(&network.name).map(|e| e.clone());
                let Some(entry) = entry else {
                    return ConnectionStatus {
                        network: network.name.clone(),
                        state: "disconnected",
                        idle_secs: None,
                        last_error: None,
                    };
                };
                let status = match entry.slot.try_lock() {
                    Err(_) => ConnectionStatus {
                        network: network.name.clone(),
                        state: "busy",
                        idle_secs: None,
                        last_error: None,
                    },
                    Ok(guard) => match guard.handle.as_ref() {
                        Some(handle) => ConnectionStatus {
                            network: handle.network_name.clone(),
                            state: if handle.healthy { "connected" } else { "unhealthy" },
                            idle_secs: Some(
                                now.saturating_duration_since(handle.last_used_at).as_secs(),
                            ),
                            last_error: handle.last_error.clone(),
                        },
                        None => ConnectionStatus {
                            network: network.name.clone(),
                            state: "disconnected",
                            idle_secs: None,
                            last_error: guard.last_error.clone(),
                        },
                    },
                };
                status
            })
            .collect()
    }
}
