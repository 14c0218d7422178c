// src/lib.rs

pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod error;
pub mod mcp;
pub mod retry;
pub mod utils;

// Re-export commonly used types
pub use ethers::types::{Address, H256, U256, U64};
pub use mcp::dispatcher::{ToolDispatcher, ToolResult};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: config::Config,
    /// Runs every tool call: validation, cache, pool, rate limits, retries
    pub dispatcher: ToolDispatcher,
}

impl AppState {
    pub fn new(config: config::Config, dispatcher: ToolDispatcher) -> Self {
        Self { config, dispatcher }
    }
}
