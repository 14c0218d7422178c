//! # Tool dispatch
//!
//! Every tool call, whichever surface it arrives on, goes through
//! [`ToolDispatcher::invoke`]:
//!
//! 1. look the tool up in the static table and validate its arguments
//! 2. resolve the network (or fan out across all of them) and check capability
//! 3. serve from the cache or join an in-flight computation
//! 4. otherwise acquire a pooled client, wrap it in the rate limiter and
//!    timeout, and run the service under the retry policy
//!
//! Failures never escape as panics or transport errors; they come back as a
//! [`ToolResult`] carrying an [`ErrorKind`].

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blockchain::pool::{ConnectionPool, PoolSettings};
use crate::blockchain::rate_limit::{RateLimitSettings, RateLimiter};
use crate::blockchain::registry::{NetworkConfig, NetworkRegistry};
use crate::blockchain::rpc::{Connector, EvmRpc, GuardedRpc, HttpConnector};
use crate::blockchain::services::price::{CoinGeckoClient, PriceSource};
use crate::blockchain::services::{account, block, contract, ens, network, price, token, transaction};
use crate::cache::{CacheKey, CacheLayer, CacheTtls};
use crate::config::Config;
use crate::error::{ErrorKind, ToolError};
use crate::mcp::tools::{self, NetworkScope, ToolArgs, ToolKind, ToolDef};
use crate::retry::{execute_with_retry, RetryPolicy, Retryable};

/// Cache-key network label for tools that do not touch a chain.
const GLOBAL_SCOPE: &str = "global";

/// The `{success, data}` / `{success, error, error_kind}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_kind: None,
        }
    }

    pub fn err(error: ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.message),
            error_kind: Some(error.kind),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"success": false, "error": "serialization failed"}))
    }
}

impl From<Result<Value, ToolError>> for ToolResult {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(data) => ToolResult::ok(data),
            Err(e) => ToolResult::err(e),
        }
    }
}

/// Failures of one attempt. Pool exhaustion already went through its own
/// reconnect loop, so only upstream call failures go back to the retry policy.
#[derive(Debug)]
enum AttemptError {
    Pool(ToolError),
    Call(ToolError),
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Pool(_) => false,
            AttemptError::Call(e) => e.is_retryable(),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Pool(e) | AttemptError::Call(e) => e.fmt(f),
        }
    }
}

/// Shared entry point for tool execution. Cheap to clone.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: NetworkRegistry,
    pool: ConnectionPool,
    limiter: RateLimiter,
    cache: CacheLayer,
    prices: Arc<dyn PriceSource>,
    retry: RetryPolicy,
    rpc_timeout: Duration,
}

/// Explicit parts, used by tests to inject mock connectors and price sources.
pub struct DispatcherParts {
    pub registry: NetworkRegistry,
    pub connector: Arc<dyn Connector>,
    pub prices: Arc<dyn PriceSource>,
    pub pool: PoolSettings,
    pub rate_limit: RateLimitSettings,
    pub ttls: CacheTtls,
    pub retry: RetryPolicy,
    pub rpc_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(parts: DispatcherParts) -> Self {
        Self {
            registry: parts.registry,
            pool: ConnectionPool::new(parts.connector, parts.pool),
            limiter: RateLimiter::new(parts.rate_limit),
            cache: CacheLayer::new(parts.ttls),
            prices: parts.prices,
            retry: parts.retry,
            rpc_timeout: parts.rpc_timeout,
        }
    }

    /// Production wiring: HTTP providers and CoinGecko.
    pub fn from_config(config: &Config) -> Result<Self, ToolError> {
        let registry = NetworkRegistry::new(config.networks(), &config.default_network)?;
        Ok(Self::new(DispatcherParts {
            registry,
            connector: Arc::new(HttpConnector),
            prices: Arc::new(CoinGeckoClient::from_config(config)?),
            pool: PoolSettings::from_config(config),
            rate_limit: RateLimitSettings::from_config(config),
            ttls: CacheTtls::from_config(config),
            retry: RetryPolicy::from_config(config),
            rpc_timeout: config.rpc_timeout,
        }))
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// `tools/list` payload.
    pub fn list_tools(&self) -> Vec<Value> {
        tools::list_tools(&self.registry.names())
    }

    /// Run one tool call to completion. Never panics, never returns a raw
    /// transport error.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult {
        let started = Instant::now();
        let result = self.try_invoke(name, &arguments).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(tool = name, elapsed_ms, "tool call succeeded"),
            Err(e) => warn!(tool = name, elapsed_ms, kind = e.kind.as_str(), error = %e.message, "tool call failed"),
        }
        result.into()
    }

    async fn try_invoke(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let def = tools::find(name)
            .ok_or_else(|| ToolError::validation(format!("Unknown tool: {}", name)))?;
        let args = tools::validate(def, arguments)?;

        match def.scope {
            NetworkScope::Global => self.run_cached(def, None, args).await,
            NetworkScope::Optional if args.network().is_none() => self.fan_out(def, args).await,
            NetworkScope::Optional | NetworkScope::Required => {
                let network = self.registry.resolve_or_default(args.network())?.clone();
                if let Some(capability) = def.capability {
                    self.registry.require_capability(&network, capability)?;
                }
                self.run_cached(def, Some(network), args).await
            }
        }
    }

    /// Run a network-optional tool on every registered network at once. One
    /// network failing does not affect the others.
    async fn fan_out(&self, def: &'static ToolDef, args: ToolArgs) -> Result<Value, ToolError> {
        let runs = self.registry.all().iter().map(|network| {
            let args = args.clone().with_network(&network.name);
            async move {
                let result = self.run_cached(def, Some(network.clone()), args).await;
                (network, result)
            }
        });
        let mut healthy = 0usize;
        let mut rows = Vec::new();
        for (network, result) in join_all(runs).await {
            match result {
                Ok(data) => {
                    healthy += 1;
                    rows.push(data);
                }
                Err(e) => rows.push(json!({
                    "network": network.name,
                    "status": "error",
                    "error": e.message,
                    "error_kind": e.kind,
                    "connection": self.connection_row(network),
                })),
            }
        }
        Ok(json!({
            "total": rows.len(),
            "healthy": healthy,
            "networks": rows,
        }))
    }

    async fn run_cached(
        &self,
        def: &'static ToolDef,
        network: Option<NetworkConfig>,
        args: ToolArgs,
    ) -> Result<Value, ToolError> {
        let label = network.as_ref().map_or(GLOBAL_SCOPE, |n| n.name.as_str());
        let key = CacheKey::new(def.name, label, args.canonical());
        let this = self.clone();
        self.cache
            .get_or_compute(key, def.ttl, move || async move { this.compute(def, network, args).await })
            .await
    }

    async fn compute(
        &self,
        def: &'static ToolDef,
        network: Option<NetworkConfig>,
        args: ToolArgs,
    ) -> Result<Value, ToolError> {
        match network {
            Some(network) => self.compute_on_network(def, &network, &args).await,
            None => self.compute_global(def, &args).await,
        }
    }

    async fn compute_global(&self, def: &'static ToolDef, args: &ToolArgs) -> Result<Value, ToolError> {
        let prices = self.prices.as_ref();
        match def.kind {
            ToolKind::GetSupportedNetworks => Ok(network::get_supported_networks(&self.registry)),
            ToolKind::ConvertUnits => network::convert_units(args),
            ToolKind::ValidateAddress => network::validate_address(args),
            ToolKind::GetTokenPrice => {
                execute_with_retry(&self.retry, |_| price::get_token_price(prices, args)).await
            }
            ToolKind::SearchTokens => {
                execute_with_retry(&self.retry, |_| price::search_tokens(prices, args)).await
            }
            other => Err(ToolError::validation(format!(
                "{:?} requires a network",
                other
            ))),
        }
    }

    async fn compute_on_network(
        &self,
        def: &'static ToolDef,
        network: &NetworkConfig,
        args: &ToolArgs,
    ) -> Result<Value, ToolError> {
        let last_call_error: Mutex<Option<ToolError>> = Mutex::new(None);
        let last_call_error = &last_call_error;
        let outcome = execute_with_retry(&self.retry, |attempt| async move {
            let client = self.pool.acquire(network).await.map_err(AttemptError::Pool)?;
            let rpc = GuardedRpc::new(client, self.limiter.clone(), &network.name, self.rpc_timeout);
            match run_service(def.kind, &rpc, network, args).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    if e.kind.is_transport() {
                        debug!(network = %network.name, attempt, error = %e, "transport failure, marking connection unhealthy");
                        self.pool.mark_unhealthy(&network.name, &e).await;
                    }
                    if let Ok(mut last) = last_call_error.lock() {
                        *last = Some(e.clone());
                    }
                    Err(AttemptError::Call(e))
                }
            }
        })
        .await;

        let mut value = match outcome {
            Ok(value) => value,
            // A reconnect that fails after an upstream call failure reports
            // the call's kind, with the reconnect failure as context.
            Err(AttemptError::Pool(pool_err)) => {
                let earlier = last_call_error.lock().ok().and_then(|mut last| last.take());
                return Err(match earlier {
                    Some(call_err) => ToolError::new(
                        call_err.kind,
                        format!("{}; reconnect failed: {}", call_err.message, pool_err.message),
                    ),
                    None => pool_err,
                });
            }
            Err(AttemptError::Call(e)) => return Err(e),
        };
        if def.kind == ToolKind::GetNetworkStatus {
            value["connection"] = self.connection_row(network);
        }
        Ok(value)
    }

    fn connection_row(&self, network: &NetworkConfig) -> Value {
        self.pool
            .status(std::slice::from_ref(network))
            .into_iter()
            .next()
            .and_then(|row| serde_json::to_value(row).ok())
            .unwrap_or(Value::Null)
    }
}

/// The chain-backed half of the dispatch table.
async fn run_service(
    kind: ToolKind,
    rpc: &dyn EvmRpc,
    net: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    match kind {
        ToolKind::GetBalance => account::get_balance(rpc, net, args).await,
        ToolKind::GetTokenBalance => account::get_token_balance(rpc, net, args).await,
        ToolKind::GetAccountInfo => account::get_account_info(rpc, net, args).await,
        ToolKind::GetTokenMetadata => token::get_token_metadata(rpc, net, args).await,
        ToolKind::GetTransaction => transaction::get_transaction(rpc, net, args).await,
        ToolKind::GetTransactionReceipt => transaction::get_transaction_receipt(rpc, net, args).await,
        ToolKind::EstimateGas => transaction::estimate_gas(rpc, net, args).await,
        ToolKind::DecodeTransactionInput => transaction::decode_transaction_input(rpc, net, args).await,
        ToolKind::GetBlock => block::get_block(rpc, net, args).await,
        ToolKind::GetLatestBlocks => block::get_latest_blocks(rpc, net, args).await,
        ToolKind::AnalyzeBlockRange => block::analyze_block_range(rpc, net, args).await,
        ToolKind::ReadContract => contract::read_contract(rpc, net, args).await,
        ToolKind::GetContractInfo => contract::get_contract_info(rpc, net, args).await,
        ToolKind::EstimateContractGas => contract::estimate_contract_gas(rpc, net, args).await,
        ToolKind::GetContractEvents => contract::get_contract_events(rpc, net, args).await,
        ToolKind::ResolveEnsName => ens::resolve_ens_name(rpc, net, args).await,
        ToolKind::ReverseResolveEns => ens::reverse_resolve_ens(rpc, net, args).await,
        ToolKind::GetEnsRecords => ens::get_ens_records(rpc, net, args).await,
        ToolKind::GetNetworkStatus => network::network_status(rpc, net).await,
        ToolKind::GetGasPrice => network::get_gas_price(rpc, net, args).await,
        ToolKind::GetSupportedNetworks
        | ToolKind::ConvertUnits
        | ToolKind::ValidateAddress
        | ToolKind::GetTokenPrice
        | ToolKind::SearchTokens => Err(ToolError::validation(format!(
            "{:?} does not run against a network",
            kind
        ))),
    }
}
