//! Shared fixtures: an in-memory `EvmRpc`, a connector handing it out per
//! network, and a canned price source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Block, BlockId, BlockNumber, Bytes, FeeHistory, Filter, Log,
    Transaction, TransactionReceipt, H256, U256, U64,
};

use evm_multichain_mcp::blockchain::pool::PoolSettings;
use evm_multichain_mcp::blockchain::rate_limit::{LimitMode, RateLimitSettings};
use evm_multichain_mcp::blockchain::registry::{builtin_networks, NetworkConfig, NetworkRegistry};
use evm_multichain_mcp::blockchain::rpc::{Connector, EvmRpc};
use evm_multichain_mcp::blockchain::services::price::{PriceQuote, PriceSource, TokenSearchHit};
use evm_multichain_mcp::cache::CacheTtls;
use evm_multichain_mcp::error::ToolError;
use evm_multichain_mcp::mcp::dispatcher::{DispatcherParts, ToolDispatcher};
use evm_multichain_mcp::retry::RetryPolicy;

pub const VITALIK: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";
pub const LATEST_BLOCK: u64 = 19_000_000;

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

/// Scriptable chain client. Every call is counted per method; setting a
/// failure makes every call (including liveness probes) return it.
pub struct MockRpc {
    calls: Mutex<HashMap<&'static str, usize>>,
    failure: Mutex<Option<ToolError>>,
    pub balance: U256,
    pub chain_id: u64,
    pub latest: u64,
    /// Artificial latency per call.
    pub delay: Duration,
}

impl MockRpc {
    pub fn new(chain_id: u64) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            balance: U256::from_dec_str("1500000000000000000").unwrap(),
            chain_id,
            latest: LATEST_BLOCK,
            delay: Duration::ZERO,
        }
    }

    pub fn unreachable(chain_id: u64) -> Self {
        let rpc = Self::new(chain_id);
        rpc.fail_with(Some(ToolError::connection("connection refused")));
        rpc
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_with(&self, failure: Option<ToolError>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Calls other than liveness probes.
    pub fn work_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| **m != "block_number")
            .map(|(_, n)| *n)
            .sum()
    }

    async fn record(&self, method: &'static str) -> Result<(), ToolError> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn block(&self, number: u64) -> Block<H256> {
        Block {
            number: Some(U64::from(number)),
            hash: Some(H256::from_low_u64_be(number)),
            parent_hash: H256::from_low_u64_be(number.saturating_sub(1)),
            timestamp: U256::from(1_700_000_000u64 + number * 12),
            gas_used: U256::from(15_000_000u64),
            gas_limit: U256::from(30_000_000u64),
            base_fee_per_gas: Some(gwei(10)),
            author: Some(Address::from_low_u64_be(0xfee)),
            transactions: vec![H256::from_low_u64_be(number * 1000)],
            ..Default::default()
        }
    }

    fn number_of(&self, id: BlockId) -> Option<u64> {
        match id {
            BlockId::Number(BlockNumber::Number(n)) if n.as_u64() <= self.latest => Some(n.as_u64()),
            BlockId::Number(BlockNumber::Number(_)) => None,
            BlockId::Number(BlockNumber::Earliest) => Some(0),
            BlockId::Number(_) => Some(self.latest),
            BlockId::Hash(h) => Some(h.to_low_u64_be()),
        }
    }
}

fn not_mocked(method: &str) -> ToolError {
    ToolError::upstream(format!("{} is not mocked", method))
}

#[async_trait]
impl EvmRpc for MockRpc {
    async fn block_number(&self) -> Result<U64, ToolError> {
        self.record("block_number").await?;
        Ok(U64::from(self.latest))
    }

    async fn chain_id(&self) -> Result<U256, ToolError> {
        self.record("chain_id").await?;
        Ok(U256::from(self.chain_id))
    }

    async fn get_balance(&self, _address: Address, _block: Option<BlockId>) -> Result<U256, ToolError> {
        self.record("get_balance").await?;
        Ok(self.balance)
    }

    async fn get_transaction_count(&self, _address: Address, _block: Option<BlockId>) -> Result<U256, ToolError> {
        self.record("get_transaction_count").await?;
        Ok(U256::from(7u64))
    }

    async fn get_code(&self, _address: Address, _block: Option<BlockId>) -> Result<Bytes, ToolError> {
        self.record("get_code").await?;
        Ok(Bytes::new())
    }

    async fn gas_price(&self) -> Result<U256, ToolError> {
        self.record("gas_price").await?;
        Ok(gwei(12))
    }

    async fn fee_history(
        &self,
        block_count: u64,
        _newest: BlockNumber,
        _percentiles: &[f64],
    ) -> Result<FeeHistory, ToolError> {
        self.record("fee_history").await?;
        Ok(FeeHistory {
            base_fee_per_gas: vec![gwei(10); block_count as usize + 1],
            gas_used_ratio: vec![0.5; block_count as usize],
            oldest_block: U256::from(self.latest - block_count + 1),
            reward: vec![vec![gwei(1), gwei(2), gwei(3)]; block_count as usize],
        })
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<Block<H256>>, ToolError> {
        self.record("get_block").await?;
        Ok(self.number_of(id).map(|n| self.block(n)))
    }

    async fn get_block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>, ToolError> {
        self.record("get_block_with_txs").await?;
        Ok(self.number_of(id).map(|n| {
            let header = self.block(n);
            let tx = Transaction {
                hash: header.transactions[0],
                from: Address::from_low_u64_be(1),
                to: Some(Address::from_low_u64_be(2)),
                gas_price: Some(gwei(10 + n % 4)),
                block_number: header.number,
                ..Default::default()
            };
            Block {
                number: header.number,
                hash: header.hash,
                parent_hash: header.parent_hash,
                timestamp: header.timestamp,
                gas_used: header.gas_used,
                gas_limit: header.gas_limit,
                base_fee_per_gas: header.base_fee_per_gas,
                author: header.author,
                transactions: vec![tx],
                ..Default::default()
            }
        }))
    }

    async fn get_transaction(&self, _hash: H256) -> Result<Option<Transaction>, ToolError> {
        self.record("get_transaction").await?;
        Ok(None)
    }

    async fn get_transaction_receipt(&self, _hash: H256) -> Result<Option<TransactionReceipt>, ToolError> {
        self.record("get_transaction_receipt").await?;
        Ok(None)
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256, ToolError> {
        self.record("estimate_gas").await?;
        Ok(U256::from(21_000u64))
    }

    async fn call(&self, _tx: &TypedTransaction) -> Result<Bytes, ToolError> {
        self.record("call").await?;
        Err(not_mocked("call"))
    }

    async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, ToolError> {
        self.record("get_logs").await?;
        Ok(Vec::new())
    }

    async fn resolve_name(&self, name: &str) -> Result<Address, ToolError> {
        self.record("resolve_name").await?;
        if name == "vitalik.eth" {
            Ok(Address::from_str(VITALIK).unwrap())
        } else {
            Err(ToolError::not_found(format!("ENS name '{}' not found", name)))
        }
    }

    async fn lookup_address(&self, _address: Address) -> Result<String, ToolError> {
        self.record("lookup_address").await?;
        Ok("vitalik.eth".to_string())
    }

    async fn resolve_field(&self, _name: &str, field: &str) -> Result<String, ToolError> {
        self.record("resolve_field").await?;
        match field {
            "url" => Ok("https://vitalik.ca".to_string()),
            _ => Err(ToolError::upstream("record not set")),
        }
    }
}

/// Hands out one shared `MockRpc` per network name. Networks without an
/// entry fail to connect.
#[derive(Default, Clone)]
pub struct MockConnector {
    pub rpcs: HashMap<String, Arc<MockRpc>>,
}

impl MockConnector {
    pub fn with(mut self, network: &str, rpc: MockRpc) -> Self {
        self.rpcs.insert(network.to_string(), Arc::new(rpc));
        self
    }

    pub fn rpc(&self, network: &str) -> Arc<MockRpc> {
        self.rpcs[network].clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, network: &NetworkConfig) -> Result<Arc<dyn EvmRpc>, ToolError> {
        match self.rpcs.get(&network.name) {
            Some(rpc) => Ok(rpc.clone() as Arc<dyn EvmRpc>),
            None => Err(ToolError::connection(format!("no route to {}", network.name))),
        }
    }
}

pub struct MockPrices;

#[async_trait]
impl PriceSource for MockPrices {
    async fn price(&self, id: &str, vs_currency: &str) -> Result<PriceQuote, ToolError> {
        Ok(PriceQuote {
            id: id.to_string(),
            currency: vs_currency.to_string(),
            price: 3000.5,
            market_cap: None,
            volume_24h: None,
            change_24h: Some(-1.25),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenSearchHit>, ToolError> {
        Ok(vec![TokenSearchHit {
            id: query.to_lowercase(),
            name: query.to_string(),
            symbol: query.to_lowercase(),
            market_cap_rank: Some(1),
            thumb: None,
            large: None,
        }])
    }
}

pub fn registry() -> NetworkRegistry {
    NetworkRegistry::new(builtin_networks(&HashMap::new()), "ethereum").unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub fn rate_limit(capacity: u32, mode: LimitMode) -> RateLimitSettings {
    RateLimitSettings {
        capacity,
        refill_per_sec: capacity as f64,
        max_wait: Duration::from_millis(500),
        mode,
    }
}

pub fn dispatcher_with(connector: MockConnector, limits: RateLimitSettings) -> ToolDispatcher {
    ToolDispatcher::new(DispatcherParts {
        registry: registry(),
        connector: Arc::new(connector),
        prices: Arc::new(MockPrices),
        pool: PoolSettings {
            stale_after: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(1),
            max_reconnect_attempts: 2,
            retry: fast_retry(),
        },
        rate_limit: limits,
        ttls: CacheTtls {
            short: Duration::from_secs(15),
            metadata: Duration::from_secs(300),
            long: Duration::from_secs(3600),
        },
        retry: fast_retry(),
        rpc_timeout: Duration::from_secs(5),
    })
}

pub fn dispatcher(connector: MockConnector) -> ToolDispatcher {
    dispatcher_with(connector, rate_limit(1000, LimitMode::Queue))
}
