// src/blockchain/services/network.rs

use ethers::types::{BlockNumber, U256};
use serde_json::{json, Value};
use tracing::debug;

use crate::blockchain::registry::{NetworkConfig, NetworkRegistry};
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::units::{self, gas_price_json};
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::{checksum, parse_address, strip_hex_prefix};

/// Reward percentiles sampled from `eth_feeHistory` (slow, standard, fast).
const REWARD_PERCENTILES: [f64; 3] = [25.0, 50.0, 75.0];
const FEE_HISTORY_BLOCKS: u64 = 4;

/// `get_supported_networks`
pub fn get_supported_networks(registry: &NetworkRegistry) -> Value {
    let networks: Vec<Value> = registry
        .all()
        .iter()
        .map(|n| {
            json!({
                "name": n.name,
                "display_name": n.display_name,
                "chain_id": n.chain_id,
                "native_token": n.native_token_symbol,
                "explorer_url": n.explorer_url,
                "supports_ens": n.supports_ens,
                "is_testnet": n.is_testnet,
            })
        })
        .collect();
    json!({
        "default_network": registry.default_network(),
        "count": networks.len(),
        "networks": networks,
    })
}

/// Chain-side half of `get_network_status`; the dispatcher adds the pool row.
pub async fn network_status(rpc: &dyn EvmRpc, network: &NetworkConfig) -> Result<Value, ToolError> {
    let reported = rpc.chain_id().await?;
    let latest = rpc.block_number().await?;
    let gas_price = rpc.gas_price().await?;
    Ok(json!({
        "network": network.name,
        "display_name": network.display_name,
        "chain_id": network.chain_id,
        "reported_chain_id": reported.low_u64(),
        "chain_id_matches": reported == U256::from(network.chain_id),
        "latest_block": latest.as_u64(),
        "gas_price": gas_price_json(gas_price),
        "is_testnet": network.is_testnet,
    }))
}

fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

/// Average of one reward column, ignoring empty samples.
fn average_reward(rewards: &[Vec<U256>], column: usize) -> Option<U256> {
    let samples: Vec<U256> = rewards.iter().filter_map(|r| r.get(column).copied()).collect();
    if samples.is_empty() {
        return None;
    }
    let sum = samples.iter().fold(U256::zero(), |acc, r| acc.saturating_add(*r));
    Some(sum / U256::from(samples.len()))
}

/// `get_gas_price`: legacy price plus EIP-1559 slow/standard/fast suggestions.
pub async fn get_gas_price(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    _args: &ToolArgs,
) -> Result<Value, ToolError> {
    let gas_price = rpc.gas_price().await?;
    let mut out = json!({
        "network": network.name,
        "gas_price": gas_price_json(gas_price),
        "eip1559": Value::Null,
    });

    let history = match rpc
        .fee_history(FEE_HISTORY_BLOCKS, BlockNumber::Latest, &REWARD_PERCENTILES)
        .await
    {
        Ok(history) => history,
        Err(e) => {
            debug!(network = %network.name, error = %e, "fee history unavailable");
            return Ok(out);
        }
    };
    // the last entry is the projected base fee of the next block
    let Some(base_fee) = history.base_fee_per_gas.last().copied() else {
        return Ok(out);
    };

    // fallback priority fees when the node reports no rewards: 1, 1.5, 2 gwei
    let fallback = [gwei(1), gwei(3) / 2, gwei(2)];
    let tiers = ["slow", "standard", "fast"];
    let mut suggestions = serde_json::Map::new();
    for (i, tier) in tiers.iter().enumerate() {
        let priority = average_reward(&history.reward, i)
            .filter(|p| !p.is_zero())
            .unwrap_or(fallback[i]);
        let max_fee = base_fee.saturating_mul(U256::from(2u64)).saturating_add(priority);
        suggestions.insert(
            tier.to_string(),
            json!({
                "max_priority_fee": gas_price_json(priority),
                "max_fee": gas_price_json(max_fee),
            }),
        );
    }
    out["eip1559"] = json!({
        "base_fee": gas_price_json(base_fee),
        "suggestions": suggestions,
    });
    Ok(out)
}

/// `convert_units`
pub fn convert_units(args: &ToolArgs) -> Result<Value, ToolError> {
    let amount = args.str("amount")?;
    let from = args.unit("from_unit")?;
    let to = args.unit("to_unit")?;
    let conversion = units::convert(amount, from, to)?;
    serde_json::to_value(conversion)
        .map_err(|e| ToolError::upstream(format!("failed to render conversion: {}", e)))
}

/// `validate_address`: never fails on a bad address, reports it instead.
pub fn validate_address(args: &ToolArgs) -> Result<Value, ToolError> {
    let input = args.str("address")?;
    let body = strip_hex_prefix(input);
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    let format_info = json!({
        "has_0x_prefix": input.starts_with("0x") || input.starts_with("0X"),
        "length": input.len(),
        "is_lowercase": has_lower && !has_upper,
        "is_uppercase": has_upper && !has_lower,
        "is_mixed_case": has_lower && has_upper,
    });

    Ok(match parse_address(input) {
        Ok(address) => {
            let checksummed = checksum(&address);
            json!({
                "address": input,
                "is_valid": true,
                "checksum_address": checksummed,
                "is_checksum": checksummed == input,
                "format_info": format_info,
            })
        }
        Err(e) => json!({
            "address": input,
            "is_valid": false,
            "checksum_address": Value::Null,
            "is_checksum": false,
            "error": e.message,
            "format_info": format_info,
        }),
    })
}
