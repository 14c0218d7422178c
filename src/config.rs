// src/config.rs

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::blockchain::rate_limit::LimitMode;
use crate::blockchain::registry::{builtin_networks, normalize_network_name, NetworkConfig};

// A struct to hold all configuration, loaded once at startup from the .env file.
#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub port: u16,

    /// Network used when a tool call omits `network`.
    pub default_network: String,
    /// Endpoint overrides keyed by registry name, merged from `CHAIN_RPC_URLS`
    /// and the per-network `<NAME>_RPC_URL` variables.
    pub rpc_url_overrides: HashMap<String, String>,

    // Price data source
    pub coingecko_api_url: String,
    pub coingecko_api_key: Option<String>,

    // Cache TTL classes
    pub cache_ttl_short: Duration,
    pub cache_ttl_metadata: Duration,
    pub cache_ttl_long: Duration,
    pub cache_sweep_interval: Duration,

    // Outbound rate limiting, per network
    pub rate_limit_per_second: f64,
    pub rate_limit_burst: u32,
    pub rate_limit_max_wait: Duration,
    pub rate_limit_mode: LimitMode,

    // Upstream calls and connection pool
    pub rpc_timeout: Duration,
    pub pool_stale_after: Duration,
    pub pool_probe_timeout: Duration,
    pub pool_max_reconnect_attempts: u32,
    pub retry_max_retries: u32,
    pub retry_initial_delay: Duration,
}

pub const DEFAULT_COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            default_network: "ethereum".to_string(),
            rpc_url_overrides: HashMap::new(),
            coingecko_api_url: DEFAULT_COINGECKO_API_URL.to_string(),
            coingecko_api_key: None,
            cache_ttl_short: Duration::from_secs(15),
            cache_ttl_metadata: Duration::from_secs(300),
            cache_ttl_long: Duration::from_secs(3600),
            cache_sweep_interval: Duration::from_secs(60),
            rate_limit_per_second: 10.0,
            rate_limit_burst: 20,
            rate_limit_max_wait: Duration::from_millis(2000),
            rate_limit_mode: LimitMode::Queue,
            rpc_timeout: Duration::from_secs(15),
            pool_stale_after: Duration::from_secs(60),
            pool_probe_timeout: Duration::from_secs(5),
            pool_max_reconnect_attempts: 3,
            retry_max_retries: 2,
            retry_initial_delay: Duration::from_millis(200),
        }
    }
}

/// Read and parse an optional variable, keeping the default when it is unset.
fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number", key)),
        _ => Ok(default),
    }
}

/// Only absolute http(s) endpoints are accepted.
fn checked_endpoint(key: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("{} is not a valid URL", key))?;
    match url.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => bail!("{} must use http or https, got '{}'", key, other),
    }
}

fn checked_rate(key: &str, rate: f64) -> Result<f64> {
    if !rate.is_finite() || rate <= 0.0 {
        bail!("{} must be a positive finite number, got {}", key, rate);
    }
    Ok(rate)
}

impl Config {
    /// Full network table with the configured endpoint overrides applied.
    pub fn networks(&self) -> Vec<NetworkConfig> {
        builtin_networks(&self.rpc_url_overrides)
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load variables from the .env file into the environment
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        // Optional JSON map of network -> RPC URL
        let mut rpc_url_overrides: HashMap<String, String> = HashMap::new();
        if let Ok(raw) = env::var("CHAIN_RPC_URLS") {
            let parsed: HashMap<String, String> = serde_json::from_str(&raw)
                .context("Invalid CHAIN_RPC_URLS JSON format, expected {\"network\": \"url\"}")?;
            for (name, url) in parsed {
                let endpoint = checked_endpoint(&format!("CHAIN_RPC_URLS[{}]", name), &url)?;
                rpc_url_overrides.insert(normalize_network_name(&name), endpoint);
            }
        }
        // Per-network variables win over the JSON map
        for network in builtin_networks(&HashMap::new()) {
            let key = format!("{}_RPC_URL", network.name.to_uppercase());
            if let Ok(url) = env::var(&key) {
                if !url.trim().is_empty() {
                    rpc_url_overrides.insert(network.name.clone(), checked_endpoint(&key, &url)?);
                }
            }
        }

        let rate_limit_mode = match env::var("RATE_LIMIT_MODE") {
            Ok(raw) => raw
                .parse::<LimitMode>()
                .map_err(anyhow::Error::msg)
                .context("RATE_LIMIT_MODE must be 'queue' or 'reject'")?,
            Err(_) => defaults.rate_limit_mode,
        };

        // CACHE_TTL is the legacy name for the metadata class
        let metadata_secs = parse_var("CACHE_TTL", defaults.cache_ttl_metadata.as_secs())?;
        let metadata_secs = parse_var("CACHE_TTL_METADATA_SECS", metadata_secs)?;

        let rate_limit_per_second = checked_rate(
            "RATE_LIMIT_PER_SECOND",
            parse_var("RATE_LIMIT_PER_SECOND", defaults.rate_limit_per_second)?,
        )?;
        let sweep_secs = parse_var(
            "CACHE_SWEEP_INTERVAL_SECS",
            defaults.cache_sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            bail!("CACHE_SWEEP_INTERVAL_SECS must be at least 1");
        }
        let rate_limit_burst = parse_var("RATE_LIMIT_BURST", defaults.rate_limit_burst)?;
        if rate_limit_burst == 0 {
            bail!("RATE_LIMIT_BURST must be at least 1");
        }

        let config = Config {
            port: parse_var("PORT", defaults.port)?,
            default_network: normalize_network_name(
                &env::var("DEFAULT_NETWORK").unwrap_or(defaults.default_network),
            ),
            rpc_url_overrides,
            coingecko_api_url: env::var("COINGECKO_API_URL")
                .unwrap_or(defaults.coingecko_api_url),
            coingecko_api_key: env::var("COINGECKO_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            cache_ttl_short: Duration::from_secs(parse_var(
                "CACHE_TTL_SHORT_SECS",
                defaults.cache_ttl_short.as_secs(),
            )?),
            cache_ttl_metadata: Duration::from_secs(metadata_secs),
            cache_ttl_long: Duration::from_secs(parse_var(
                "CACHE_TTL_LONG_SECS",
                defaults.cache_ttl_long.as_secs(),
            )?),
            cache_sweep_interval: Duration::from_secs(sweep_secs),
            rate_limit_per_second,
            rate_limit_burst,
            rate_limit_max_wait: Duration::from_millis(parse_var(
                "RATE_LIMIT_MAX_WAIT_MS",
                defaults.rate_limit_max_wait.as_millis() as u64,
            )?),
            rate_limit_mode,
            rpc_timeout: Duration::from_secs(parse_var(
                "RPC_TIMEOUT_SECS",
                defaults.rpc_timeout.as_secs(),
            )?),
            pool_stale_after: Duration::from_secs(parse_var(
                "POOL_STALE_AFTER_SECS",
                defaults.pool_stale_after.as_secs(),
            )?),
            pool_probe_timeout: Duration::from_secs(parse_var(
                "POOL_PROBE_TIMEOUT_SECS",
                defaults.pool_probe_timeout.as_secs(),
            )?),
            pool_max_reconnect_attempts: parse_var(
                "POOL_MAX_RECONNECT_ATTEMPTS",
                defaults.pool_max_reconnect_attempts,
            )?
            .max(1),
            retry_max_retries: parse_var("RETRY_MAX_RETRIES", defaults.retry_max_retries)?,
            retry_initial_delay: Duration::from_millis(parse_var(
                "RETRY_INITIAL_DELAY_MS",
                defaults.retry_initial_delay.as_millis() as u64,
            )?),
        };

        if !config.networks().iter().any(|n| n.name == config.default_network) {
            bail!(
                "DEFAULT_NETWORK '{}' is not a supported network",
                config.default_network
            );
        }

        Ok(config)
    }
}
