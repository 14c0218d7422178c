//! Upstream JSON-RPC seam.
//!
//! Tool services talk to an [`EvmRpc`] trait object rather than to
//! `Provider<Http>` directly, so the pool can hand out guarded clients and
//! tests can substitute an in-memory node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{
        transaction::eip2718::TypedTransaction, Address, Block, BlockId, BlockNumber, Bytes,
        FeeHistory, Filter, Log, Transaction, TransactionReceipt, H256, U256, U64,
    },
};
use tokio::time::timeout;

use crate::blockchain::rate_limit::RateLimiter;
use crate::blockchain::registry::NetworkConfig;
use crate::error::ToolError;

/// The subset of node RPC the tools need. Errors are already classified.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn block_number(&self) -> Result<U64, ToolError>;
    async fn chain_id(&self) -> Result<U256, ToolError>;
    async fn get_balance(&self, address: Address, block: Option<BlockId>) -> Result<U256, ToolError>;
    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> Result<U256, ToolError>;
    async fn get_code(&self, address: Address, block: Option<BlockId>) -> Result<Bytes, ToolError>;
    async fn gas_price(&self) -> Result<U256, ToolError>;
    async fn fee_history(
        &self,
        block_count: u64,
        newest: BlockNumber,
        percentiles: &[f64],
    ) -> Result<FeeHistory, ToolError>;
    async fn get_block(&self, id: BlockId) -> Result<Option<Block<H256>>, ToolError>;
    async fn get_block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>, ToolError>;
    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, ToolError>;
    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, ToolError>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ToolError>;
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ToolError>;
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ToolError>;
    async fn resolve_name(&self, name: &str) -> Result<Address, ToolError>;
    async fn lookup_address(&self, address: Address) -> Result<String, ToolError>;
    async fn resolve_field(&self, name: &str, field: &str) -> Result<String, ToolError>;
}

/// `ethers` HTTP provider behind the [`EvmRpc`] seam.
#[derive(Debug, Clone)]
pub struct ProviderRpc {
    provider: Provider<Http>,
}

impl ProviderRpc {
    pub fn new(provider: Provider<Http>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl EvmRpc for ProviderRpc {
    async fn block_number(&self) -> Result<U64, ToolError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn chain_id(&self) -> Result<U256, ToolError> {
        Ok(self.provider.get_chainid().await?)
    }

    async fn get_balance(&self, address: Address, block: Option<BlockId>) -> Result<U256, ToolError> {
        Ok(self.provider.get_balance(address, block).await?)
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> Result<U256, ToolError> {
        Ok(self.provider.get_transaction_count(address, block).await?)
    }

    async fn get_code(&self, address: Address, block: Option<BlockId>) -> Result<Bytes, ToolError> {
        Ok(self.provider.get_code(address, block).await?)
    }

    async fn gas_price(&self) -> Result<U256, ToolError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn fee_history(
        &self,
        block_count: u64,
        newest: BlockNumber,
        percentiles: &[f64],
    ) -> Result<FeeHistory, ToolError> {
        Ok(self
            .provider
            .fee_history(U256::from(block_count), newest, percentiles)
            .await?)
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<Block<H256>>, ToolError> {
        Ok(self.provider.get_block(id).await?)
    }

    async fn get_block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>, ToolError> {
        Ok(self.provider.get_block_with_txs(id).await?)
    }

    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, ToolError> {
        Ok(self.provider.get_transaction(hash).await?)
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, ToolError> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ToolError> {
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ToolError> {
        Ok(self.provider.call(tx, None).await?)
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ToolError> {
        Ok(self.provider.get_logs(filter).await?)
    }

    async fn resolve_name(&self, name: &str) -> Result<Address, ToolError> {
        Ok(self.provider.resolve_name(name).await?)
    }

    async fn lookup_address(&self, address: Address) -> Result<String, ToolError> {
        Ok(self.provider.lookup_address(address).await?)
    }

    async fn resolve_field(&self, name: &str, field: &str) -> Result<String, ToolError> {
        Ok(self.provider.resolve_field(name, field).await?)
    }
}

/// Builds fresh clients for the pool.
pub trait Connector: Send + Sync {
    fn connect(&self, network: &NetworkConfig) -> Result<Arc<dyn EvmRpc>, ToolError>;
}

/// Default connector: one `Provider<Http>` per endpoint.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, network: &NetworkConfig) -> Result<Arc<dyn EvmRpc>, ToolError> {
        let provider = Provider::<Http>::try_from(network.endpoint_url.as_str()).map_err(|e| {
            ToolError::connection(format!(
                "Failed to create provider for {}: {}",
                network.name, e
            ))
        })?;
        Ok(Arc::new(ProviderRpc::new(provider)))
    }
}

/// Client handed to tool services: every call takes a rate-limit permit for
/// its network and runs under the upstream timeout.
#[derive(Clone)]
pub struct GuardedRpc {
    inner: Arc<dyn EvmRpc>,
    limiter: RateLimiter,
    network: String,
    timeout: Duration,
}

impl GuardedRpc {
    pub fn new(inner: Arc<dyn EvmRpc>, limiter: RateLimiter, network: &str, timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            network: network.to_string(),
            timeout,
        }
    }

    async fn guard<T, F>(&self, method: &str, fut: F) -> Result<T, ToolError>
    where
        F: std::future::Future<Output = Result<T, ToolError>> + Send,
    {
        self.limiter.acquire(&self.network).await?;
        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::timeout(format!(
                "{} on {} timed out after {}s",
                method,
                self.network,
                self.timeout.as_secs_f64()
            ))),
        }
    }
}

#[async_trait]
impl EvmRpc for GuardedRpc {
    async fn block_number(&self) -> Result<U64, ToolError> {
        self.guard("eth_blockNumber", self.inner.block_number()).await
    }

    async fn chain_id(&self) -> Result<U256, ToolError> {
        self.guard("eth_chainId", self.inner.chain_id()).await
    }

    async fn get_balance(&self, address: Address, block: Option<BlockId>) -> Result<U256, ToolError> {
        self.guard("eth_getBalance", self.inner.get_balance(address, block))
            .await
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        block: Option<BlockId>,
    ) -> Result<U256, ToolError> {
        self.guard(
            "eth_getTransactionCount",
            self.inner.get_transaction_count(address, block),
        )
        .await
    }

    async fn get_code(&self, address: Address, block: Option<BlockId>) -> Result<Bytes, ToolError> {
        self.guard("eth_getCode", self.inner.get_code(address, block))
            .await
    }

    async fn gas_price(&self) -> Result<U256, ToolError> {
        self.guard("eth_gasPrice", self.inner.gas_price()).await
    }

    async fn fee_history(
        &self,
        block_count: u64,
        newest: BlockNumber,
        percentiles: &[f64],
    ) -> Result<FeeHistory, ToolError> {
        self.guard(
            "eth_feeHistory",
            self.inner.fee_history(block_count, newest, percentiles),
        )
        .await
    }

    async fn get_block(&self, id: BlockId) -> Result<Option<Block<H256>>, ToolError> {
        self.guard("eth_getBlockByNumber", self.inner.get_block(id)).await
    }

    async fn get_block_with_txs(&self, id: BlockId) -> Result<Option<Block<Transaction>>, ToolError> {
        self.guard("eth_getBlockByNumber", self.inner.get_block_with_txs(id))
            .await
    }

    async fn get_transaction(&self, hash: H256) -> Result<Option<Transaction>, ToolError> {
        self.guard("eth_getTransactionByHash", self.inner.get_transaction(hash))
            .await
    }

    async fn get_transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, ToolError> {
        self.guard(
            "eth_getTransactionReceipt",
            self.inner.get_transaction_receipt(hash),
        )
        .await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ToolError> {
        self.guard("eth_estimateGas", self.inner.estimate_gas(tx)).await
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ToolError> {
        self.guard("eth_call", self.inner.call(tx)).await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, ToolError> {
        self.guard("eth_getLogs", self.inner.get_logs(filter)).await
    }

    async fn resolve_name(&self, name: &str) -> Result<Address, ToolError> {
        self.guard("ens_resolve", self.inner.resolve_name(name)).await
    }

    async fn lookup_address(&self, address: Address) -> Result<String, ToolError> {
        self.guard("ens_lookup", self.inner.lookup_address(address))
            .await
    }

    async fn resolve_field(&self, name: &str, field: &str) -> Result<String, ToolError> {
        self.guard("ens_text", self.inner.resolve_field(name, field))
            .await
    }
}
