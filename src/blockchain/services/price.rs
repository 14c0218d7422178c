//! Market data (price and token search) from CoinGecko.
//!
//! Prices are display-only floats straight from the data source; nothing here
//! feeds on-chain arithmetic.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;

pub const DEFAULT_SEARCH_LIMIT: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub id: String,
    pub currency: String,
    pub price: f64,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSearchHit {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub market_cap_rank: Option<u64>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

/// Opaque price and search provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price(&self, id: &str, vs_currency: &str) -> Result<PriceQuote, ToolError>;
    async fn search(&self, query: &str) -> Result<Vec<TokenSearchHit>, ToolError>;
}

/// Symbols users type mapped to CoinGecko coin ids.
pub fn coingecko_id(symbol: &str) -> String {
    let lower = symbol.trim().to_lowercase();
    let id = match lower.as_str() {
        "eth" | "weth" => "ethereum",
        "btc" | "wbtc" => "bitcoin",
        "matic" | "pol" => "matic-network",
        "bnb" => "binancecoin",
        "avax" => "avalanche-2",
        "ftm" => "fantom",
        "arb" => "arbitrum",
        "op" => "optimism",
        "usdc" => "usd-coin",
        "usdt" => "tether",
        "dai" => "dai",
        "link" => "chainlink",
        "uni" => "uniswap",
        "aave" => "aave",
        "sol" => "solana",
        "shib" => "shiba-inu",
        "ldo" => "lido-dao",
        "mkr" => "maker",
        "crv" => "curve-dao-token",
        _ => return lower,
    };
    id.to_string()
}

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ToolError::upstream(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ToolError> {
        Self::new(&config.coingecko_api_url, config.coingecko_api_key.clone())
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ToolError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }
        debug!(path, "querying price source");
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn price(&self, id: &str, vs_currency: &str) -> Result<PriceQuote, ToolError> {
        let body = self
            .get_json(
                "/simple/price",
                &[
                    ("ids", id),
                    ("vs_currencies", vs_currency),
                    ("include_24hr_change", "true"),
                    ("include_market_cap", "true"),
                    ("include_24hr_vol", "true"),
                ],
            )
            .await?;
        let entry = body
            .get(id)
            .ok_or_else(|| ToolError::not_found(format!("No price data for token '{}'", id)))?;
        let price = entry.get(vs_currency).and_then(Value::as_f64).ok_or_else(|| {
            ToolError::not_found(format!("No {} price for token '{}'", vs_currency, id))
        })?;
        let field = |suffix: &str| {
            entry
                .get(format!("{}_{}", vs_currency, suffix))
                .and_then(Value::as_f64)
        };
        Ok(PriceQuote {
            id: id.to_string(),
            currency: vs_currency.to_string(),
            price,
            market_cap: field("market_cap"),
            volume_24h: field("24h_vol"),
            change_24h: field("24h_change"),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<TokenSearchHit>, ToolError> {
        let body = self.get_json("/search", &[("query", query)]).await?;
        let coins = body.get("coins").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(coins)
            .map_err(|e| ToolError::upstream(format!("Unexpected search response: {}", e)))
    }
}

/// `get_token_price`
pub async fn get_token_price(source: &dyn PriceSource, args: &ToolArgs) -> Result<Value, ToolError> {
    let symbol = args.str("token_symbol")?;
    let vs_currency = args.opt_str("vs_currency").unwrap_or("usd").to_lowercase();
    let id = coingecko_id(symbol);
    let quote = source.price(&id, &vs_currency).await?;
    Ok(json!({
        "symbol": symbol.to_uppercase(),
        "coingecko_id": quote.id,
        "currency": quote.currency.to_uppercase(),
        "price": quote.price,
        "market_cap": quote.market_cap,
        "volume_24h": quote.volume_24h,
        "change_24h": quote.change_24h,
    }))
}

/// `search_tokens`
pub async fn search_tokens(source: &dyn PriceSource, args: &ToolArgs) -> Result<Value, ToolError> {
    let query = args.str("query")?;
    let limit = args.opt_u64("limit").unwrap_or(DEFAULT_SEARCH_LIMIT) as usize;
    let tokens: Vec<Value> = source
        .search(query)
        .await?
        .into_iter()
        .take(limit)
        .map(|hit| {
            json!({
                "id": hit.id,
                "name": hit.name,
                "symbol": hit.symbol.to_uppercase(),
                "market_cap_rank": hit.market_cap_rank,
                "thumb": hit.thumb,
                "large": hit.large,
            })
        })
        .collect();
    Ok(json!({
        "query": query,
        "results_count": tokens.len(),
        "tokens": tokens,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_symbols_map_to_ids() {
        assert_eq!(coingecko_id("ETH"), "ethereum");
        assert_eq!(coingecko_id("usdc"), "usd-coin");
        assert_eq!(coingecko_id("some-coin"), "some-coin");
    }
}
