// src/blockchain/mod.rs

pub mod pool;
pub mod rate_limit;
pub mod registry;
pub mod rpc;
pub mod services;
pub mod units;

pub use pool::ConnectionPool;
pub use rate_limit::RateLimiter;
pub use registry::{NetworkConfig, NetworkRegistry};
pub use rpc::{EvmRpc, GuardedRpc};

// Re-export commonly used types
pub use ethers::{
    types::{Address, H256, U256, U64},
    utils::to_checksum,
};
