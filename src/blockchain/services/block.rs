// src/blockchain/services/block.rs

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use ethers::types::{Address, Block, BlockId, BlockNumber, Transaction, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::services::contract::resolve_block;
use crate::blockchain::units::{amount_json, gas_price_json};
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

pub const DEFAULT_LATEST_BLOCKS: u64 = 5;
/// Widest range `analyze_block_range` accepts (inclusive count).
pub const MAX_ANALYZE_RANGE: u64 = 100;
const TOP_MINERS: usize = 10;
/// Concurrent block fetches per request.
const FETCH_CONCURRENCY: usize = 5;

fn iso_timestamp(ts: U256) -> Option<String> {
    let secs = i64::try_from(ts.low_u64()).ok()?;
    Utc.timestamp_opt(secs, 0).single().map(|t| t.to_rfc3339())
}

fn utilization(used: U256, limit: U256) -> f64 {
    if limit.is_zero() {
        return 0.0;
    }
    // both fit comfortably in f64 for any real block
    (used.low_u128() as f64 / limit.low_u128() as f64 * 10_000.0).round() / 100.0
}

fn header_json<T>(block: &Block<T>) -> Value {
    json!({
        "number": block.number.map(|n| n.as_u64()),
        "hash": block.hash.map(|h| format!("{:#x}", h)),
        "parent_hash": format!("{:#x}", block.parent_hash),
        "timestamp": block.timestamp.low_u64(),
        "timestamp_iso": iso_timestamp(block.timestamp),
        "miner": block.author.as_ref().map(checksum),
        "gas_used": block.gas_used.to_string(),
        "gas_limit": block.gas_limit.to_string(),
        "gas_utilization_percent": utilization(block.gas_used, block.gas_limit),
        "base_fee_per_gas": block.base_fee_per_gas.map(gas_price_json),
        "transaction_count": block.transactions.len(),
        "size": block.size.map(|s| s.low_u64()),
    })
}

fn tx_summary(tx: &Transaction, symbol: &str) -> Value {
    json!({
        "hash": format!("{:#x}", tx.hash),
        "from": checksum(&tx.from),
        "to": tx.to.as_ref().map(checksum),
        "value": amount_json(tx.value, symbol),
        "gas": tx.gas.to_string(),
        "gas_price": tx.gas_price.map(gas_price_json),
    })
}

fn block_not_found(id: &BlockId) -> ToolError {
    let label = match id {
        BlockId::Hash(h) => format!("{:#x}", h),
        BlockId::Number(BlockNumber::Number(n)) => n.to_string(),
        BlockId::Number(tag) => tag.to_string(),
    };
    ToolError::not_found(format!("Block {} not found", label))
}

/// `get_block`
pub async fn get_block(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let id = args.block_id("block_identifier")?;
    let full = args.bool_or("full_transactions", false);

    let mut out = if full {
        let block = rpc
            .get_block_with_txs(id)
            .await?
            .ok_or_else(|| block_not_found(&id))?;
        let mut out = header_json(&block);
        out["transactions"] = block
            .transactions
            .iter()
            .map(|tx| tx_summary(tx, &network.native_token_symbol))
            .collect();
        out
    } else {
        let block = rpc.get_block(id).await?.ok_or_else(|| block_not_found(&id))?;
        let mut out = header_json(&block);
        out["transactions"] = block
            .transactions
            .iter()
            .map(|h| Value::String(format!("{:#x}", h)))
            .collect();
        out
    };
    out["network"] = json!(network.name);
    Ok(out)
}

/// `get_latest_blocks`: newest first.
pub async fn get_latest_blocks(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let count = args.opt_u64("count").unwrap_or(DEFAULT_LATEST_BLOCKS);
    let latest = rpc.block_number().await?.as_u64();
    let first = latest.saturating_sub(count.saturating_sub(1));

    let blocks: Vec<Option<Block<_>>> = stream::iter((first..=latest).rev())
        .map(|n| rpc.get_block(BlockId::Number(BlockNumber::Number(n.into()))))
        .buffered(FETCH_CONCURRENCY)
        .try_collect()
        .await?;
    let blocks: Vec<Value> = blocks.iter().flatten().map(header_json).collect();

    Ok(json!({
        "network": network.name,
        "latest_block": latest,
        "count": blocks.len(),
        "blocks": blocks,
    }))
}

/// Floor of `(a + b) / 2` without the intermediate sum.
fn midpoint(a: U256, b: U256) -> U256 {
    let two = U256::from(2u64);
    a / two + b / two + (a % two + b % two) / two
}

/// Sorted gas prices of every transaction in the range.
fn gas_price_stats(mut prices: Vec<U256>) -> Value {
    if prices.is_empty() {
        return Value::Null;
    }
    prices.sort();
    let n = prices.len();
    let median = if n % 2 == 1 {
        prices[n / 2]
    } else {
        midpoint(prices[n / 2 - 1], prices[n / 2])
    };
    let sum = prices.iter().fold(U256::zero(), |acc, p| acc.saturating_add(*p));
    json!({
        "min": gas_price_json(prices[0]),
        "max": gas_price_json(prices[n - 1]),
        "median": gas_price_json(median),
        "average": gas_price_json(sum / U256::from(n)),
        "samples": n,
    })
}

fn block_time_stats(timestamps: &[u64]) -> Value {
    let gaps: Vec<u64> = timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]))
        .collect();
    if gaps.is_empty() {
        return Value::Null;
    }
    let total: u64 = gaps.iter().sum();
    json!({
        "average_seconds": (total as f64 / gaps.len() as f64 * 100.0).round() / 100.0,
        "min_seconds": gaps.iter().min(),
        "max_seconds": gaps.iter().max(),
    })
}

/// `analyze_block_range`
pub async fn analyze_block_range(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let mut latest = None;
    let start = resolve_block(rpc, args.opt_block_id("start_block")?, &mut latest)
        .await?
        .ok_or_else(|| ToolError::validation("Missing or invalid required argument: 'start_block'"))?;
    let end = resolve_block(rpc, args.opt_block_id("end_block")?, &mut latest)
        .await?
        .ok_or_else(|| ToolError::validation("Missing or invalid required argument: 'end_block'"))?;
    if start > end {
        return Err(ToolError::validation(format!(
            "start_block {} is after end_block {}",
            start, end
        )));
    }
    let span = end - start + 1;
    if span > MAX_ANALYZE_RANGE {
        return Err(ToolError::validation(format!(
            "block range too large: {} blocks (max {})",
            span, MAX_ANALYZE_RANGE
        )));
    }

    let fetched: Vec<Option<Block<Transaction>>> = stream::iter(start..=end)
        .map(|n| rpc.get_block_with_txs(BlockId::Number(BlockNumber::Number(n.into()))))
        .buffered(FETCH_CONCURRENCY)
        .try_collect()
        .await?;
    let blocks: Vec<Block<Transaction>> = fetched.into_iter().flatten().collect();
    if blocks.is_empty() {
        return Err(ToolError::not_found(format!(
            "No blocks found between {} and {}",
            start, end
        )));
    }

    let tx_counts: Vec<usize> = blocks.iter().map(|b| b.transactions.len()).collect();
    let total_txs: usize = tx_counts.iter().sum();
    let total_gas = blocks
        .iter()
        .fold(U256::zero(), |acc, b| acc.saturating_add(b.gas_used));
    let utilizations: Vec<f64> = blocks
        .iter()
        .map(|b| utilization(b.gas_used, b.gas_limit))
        .collect();
    let prices: Vec<U256> = blocks
        .iter()
        .flat_map(|b| b.transactions.iter())
        .filter_map(|tx| tx.gas_price.or(tx.max_fee_per_gas))
        .collect();
    let timestamps: Vec<u64> = blocks.iter().map(|b| b.timestamp.low_u64()).collect();

    let mut miners: HashMap<Address, u64> = HashMap::new();
    for miner in blocks.iter().filter_map(|b| b.author) {
        *miners.entry(miner).or_default() += 1;
    }
    let mut ranked: Vec<(Address, u64)> = miners.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let analyzed = blocks.len();
    let top_miners: Vec<Value> = ranked
        .into_iter()
        .take(TOP_MINERS)
        .map(|(address, count)| {
            json!({
                "address": checksum(&address),
                "blocks": count,
                "share_percent": (count as f64 / analyzed as f64 * 10_000.0).round() / 100.0,
            })
        })
        .collect();

    Ok(json!({
        "network": network.name,
        "start_block": start,
        "end_block": end,
        "blocks_analyzed": analyzed,
        "transactions": {
            "total": total_txs,
            "average_per_block": (total_txs as f64 / analyzed as f64 * 100.0).round() / 100.0,
            "min_per_block": tx_counts.iter().min(),
            "max_per_block": tx_counts.iter().max(),
        },
        "gas": {
            "total_used": total_gas.to_string(),
            "average_used": (total_gas / U256::from(analyzed)).to_string(),
            "average_utilization_percent":
                (utilizations.iter().sum::<f64>() / analyzed as f64 * 100.0).round() / 100.0,
        },
        "gas_price": gas_price_stats(prices),
        "block_time": block_time_stats(&timestamps),
        "top_miners": top_miners,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_sample_averages_middle_pair() {
        let stats = gas_price_stats(vec![
            U256::from(4_000_000_000u64),
            U256::from(1_000_000_000u64),
            U256::from(3_000_000_000u64),
            U256::from(2_000_000_000u64),
        ]);
        assert_eq!(stats["median"]["wei"], "2500000000");
        assert_eq!(stats["min"]["wei"], "1000000000");
        assert_eq!(stats["max"]["wei"], "4000000000");
        assert_eq!(stats["samples"], 4);
    }

    #[test]
    fn median_of_huge_prices_does_not_overflow() {
        let stats = gas_price_stats(vec![U256::MAX, U256::MAX - 2]);
        assert_eq!(stats["median"]["wei"], json!((U256::MAX - 1).to_string()));
        assert_eq!(midpoint(U256::from(3u64), U256::from(4u64)), U256::from(3u64));
    }

    #[test]
    fn empty_range_statistics_are_null() {
        assert!(gas_price_stats(Vec::new()).is_null());
        assert!(block_time_stats(&[100]).is_null());
    }

    #[test]
    fn block_times_from_timestamps() {
        let stats = block_time_stats(&[100, 112, 124, 139]);
        assert_eq!(stats["min_seconds"], 12);
        assert_eq!(stats["max_seconds"], 15);
        assert_eq!(stats["average_seconds"], 13.0);
    }

    #[test]
    fn utilization_is_a_rounded_percentage() {
        assert_eq!(utilization(U256::from(15_000_000u64), U256::from(30_000_000u64)), 50.0);
        assert_eq!(utilization(U256::from(1u64), U256::zero()), 0.0);
    }

    #[test]
    fn iso_timestamps_are_utc() {
        assert_eq!(
            iso_timestamp(U256::from(1_700_000_000u64)).as_deref(),
            Some("2023-11-14T22:13:20+00:00")
        );
    }
}
