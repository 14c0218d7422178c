// src/blockchain/services/transaction.rs

use ethers::abi::{Abi, Function};
use ethers::types::{
    transaction::eip2718::TypedTransaction, BlockId, BlockNumber, Transaction, TransactionReceipt,
    TransactionRequest, U256,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::services::contract::{decode_function_input, erc20_abi, fee, function_signature};
use crate::blockchain::units::{amount_json, gas_price_json};
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

/// Well-known 4-byte selectors reported even without an ABI.
const COMMON_SELECTORS: &[(&str, &str)] = &[
    ("0xa9059cbb", "transfer(address,uint256)"),
    ("0x23b872dd", "transferFrom(address,address,uint256)"),
    ("0x095ea7b3", "approve(address,uint256)"),
    ("0x40c10f19", "mint(address,uint256)"),
    ("0x42966c68", "burn(uint256)"),
    ("0x70a08231", "balanceOf(address)"),
];

/// Calls behind the well-known selectors that ERC-20 itself does not define.
const EXTRA_KNOWN_CALLS: &[&str] = &[
    "function mint(address to, uint256 amount)",
    "function burn(uint256 amount)",
];

/// ERC-20 plus the extra well-known calls, used when no ABI is supplied.
fn known_calls_abi() -> Result<Abi, ToolError> {
    let mut abi = erc20_abi()?;
    let extra = ethers::abi::parse_abi(EXTRA_KNOWN_CALLS)
        .map_err(|e| ToolError::upstream(format!("built-in call table failed to parse: {}", e)))?;
    for (name, functions) in extra.functions {
        abi.functions.entry(name).or_default().extend(functions);
    }
    Ok(abi)
}

fn function_for_selector<'a>(abi: &'a Abi, input: &[u8]) -> Option<&'a Function> {
    abi.functions().find(|f| input.len() >= 4 && f.short_signature()[..] == input[..4])
}

fn receipt_status(receipt: &TransactionReceipt) -> &'static str {
    match receipt.status.map(|s| s.as_u64()) {
        Some(1) => "success",
        Some(_) => "failed",
        // pre-Byzantium receipts carry no status
        None => "unknown",
    }
}

fn receipt_json(receipt: &TransactionReceipt, symbol: &str) -> Value {
    let effective_price = receipt.effective_gas_price.unwrap_or_default();
    let gas_used = receipt.gas_used.unwrap_or_default();
    json!({
        "transaction_hash": format!("{:#x}", receipt.transaction_hash),
        "block_number": receipt.block_number.map(|n| n.as_u64()),
        "block_hash": receipt.block_hash.map(|h| format!("{:#x}", h)),
        "transaction_index": receipt.transaction_index.as_u64(),
        "from": checksum(&receipt.from),
        "to": receipt.to.as_ref().map(checksum),
        "status": receipt_status(receipt),
        "gas_used": gas_used.to_string(),
        "cumulative_gas_used": receipt.cumulative_gas_used.to_string(),
        "effective_gas_price": gas_price_json(effective_price),
        "transaction_fee": amount_json(fee(gas_used, effective_price), symbol),
        "contract_address": receipt.contract_address.as_ref().map(checksum),
        "logs_count": receipt.logs.len(),
    })
}

fn transaction_json(tx: &Transaction, symbol: &str) -> Value {
    json!({
        "hash": format!("{:#x}", tx.hash),
        "from": checksum(&tx.from),
        "to": tx.to.as_ref().map(checksum),
        "value": amount_json(tx.value, symbol),
        "gas": tx.gas.to_string(),
        "gas_price": tx.gas_price.map(gas_price_json),
        "max_fee_per_gas": tx.max_fee_per_gas.map(gas_price_json),
        "max_priority_fee_per_gas": tx.max_priority_fee_per_gas.map(gas_price_json),
        "nonce": tx.nonce.to_string(),
        "block_number": tx.block_number.map(|n| n.as_u64()),
        "block_hash": tx.block_hash.map(|h| format!("{:#x}", h)),
        "transaction_index": tx.transaction_index.map(|i| i.as_u64()),
        "type": tx.transaction_type.map(|t| t.as_u64()),
        "input": format!("0x{}", hex::encode(&tx.input)),
    })
}

/// `get_transaction`
pub async fn get_transaction(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let hash = args.tx_hash("tx_hash")?;
    let tx = rpc
        .get_transaction(hash)
        .await?
        .ok_or_else(|| ToolError::not_found(format!("Transaction {:#x} not found", hash)))?;

    let symbol = &network.native_token_symbol;
    let mut out = transaction_json(&tx, symbol);
    if tx.block_number.is_some() {
        match rpc.get_transaction_receipt(hash).await? {
            Some(receipt) => {
                out["status"] = json!(receipt_status(&receipt));
                out["receipt"] = receipt_json(&receipt, symbol);
            }
            None => out["status"] = json!("unknown"),
        }
    } else {
        out["status"] = json!("pending");
        let price = tx.gas_price.or(tx.max_fee_per_gas).unwrap_or_default();
        out["max_fee"] = amount_json(fee(tx.gas, price), symbol);
    }
    out["network"] = json!(network.name);
    out["explorer_url"] = json!(format!("{}/tx/{:#x}", network.explorer_url, hash));
    Ok(out)
}

/// `get_transaction_receipt`
pub async fn get_transaction_receipt(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let hash = args.tx_hash("tx_hash")?;
    let receipt = rpc.get_transaction_receipt(hash).await?.ok_or_else(|| {
        ToolError::not_found(format!(
            "Receipt for {:#x} not found (transaction may be pending)",
            hash
        ))
    })?;
    let mut out = receipt_json(&receipt, &network.native_token_symbol);
    out["network"] = json!(network.name);
    Ok(out)
}

/// `estimate_gas`
pub async fn estimate_gas(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let from = args.address("from_address")?;
    let to = args.opt_address("to_address")?;
    let value = args.opt_wei("value")?.unwrap_or_default();
    let data = args.opt_bytes("data")?;

    let mut request = TransactionRequest::new().from(from).value(value);
    if let Some(to) = to {
        request = request.to(to);
    }
    if let Some(data) = data {
        request = request.data(data);
    }
    let tx: TypedTransaction = request.into();

    let symbol = &network.native_token_symbol;
    let gas = rpc.estimate_gas(&tx).await?;
    let gas_price = rpc.gas_price().await?;
    let mut out = json!({
        "from": checksum(&from),
        "to": to.as_ref().map(checksum),
        "value": amount_json(value, symbol),
        "gas_estimate": gas.to_string(),
        "gas_price": gas_price_json(gas_price),
        "estimated_cost": amount_json(fee(gas, gas_price), symbol),
        "network": network.name,
    });

    // EIP-1559 suggestion; chains without a base fee simply omit it
    match rpc.get_block(BlockId::Number(BlockNumber::Latest)).await {
        Ok(Some(block)) => {
            if let Some(base_fee) = block.base_fee_per_gas {
                let priority = gas_price.saturating_sub(base_fee).max(U256::exp10(9));
                let max_fee = base_fee.saturating_mul(U256::from(2u64)).saturating_add(priority);
                out["eip1559_fees"] = json!({
                    "base_fee": gas_price_json(base_fee),
                    "max_priority_fee": gas_price_json(priority),
                    "max_fee": gas_price_json(max_fee),
                    "max_cost": amount_json(fee(gas, max_fee), symbol),
                });
            }
        }
        Ok(None) => {}
        Err(e) => debug!(network = %network.name, error = %e, "no base fee available"),
    }
    Ok(out)
}

/// `decode_transaction_input`
pub async fn decode_transaction_input(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let hash = args.tx_hash("tx_hash")?;
    let user_abi = args.opt_abi("abi")?;
    let tx = rpc
        .get_transaction(hash)
        .await?
        .ok_or_else(|| ToolError::not_found(format!("Transaction {:#x} not found", hash)))?;

    let input = tx.input.to_vec();
    let mut out = json!({
        "transaction_hash": format!("{:#x}", hash),
        "to": tx.to.as_ref().map(checksum),
        "input_data": format!("0x{}", hex::encode(&input)),
        "network": network.name,
    });

    if input.is_empty() {
        out["decoded"] = json!({
            "type": "simple_transfer",
            "description": format!("Plain {} transfer with no call data", network.native_token_symbol),
        });
        return Ok(out);
    }
    if input.len() < 4 {
        out["decoded"] = json!({
            "type": "unknown",
            "description": "Call data shorter than a function selector",
        });
        return Ok(out);
    }

    let selector = format!("0x{}", hex::encode(&input[..4]));
    out["function_selector"] = json!(selector);
    let known = COMMON_SELECTORS
        .iter()
        .find(|(sel, _)| *sel == selector)
        .map(|(_, sig)| *sig);
    let mut decoded = json!({
        "type": "contract_call",
        "function": known.unwrap_or("unknown"),
        "description": match known {
            Some(sig) => format!("Call to {}", sig),
            None => format!("Contract call with selector {}", selector),
        },
    });

    // Decode arguments with the caller's ABI, else with the built-in table for known selectors
    let supplied = user_abi.is_some();
    let abi = match user_abi {
        Some(abi) => Some(abi),
        None if known.is_some() => Some(known_calls_abi()?),
        None => None,
    };
    if let Some(abi) = abi {
        match function_for_selector(&abi, &input) {
            Some(func) => {
                decoded["function"] = json!(function_signature(func));
                match decode_function_input(func, &input) {
                    Ok(inputs) => decoded["inputs"] = inputs,
                    Err(e) => decoded["decode_error"] = json!(e.message),
                }
            }
            None if supplied => {
                decoded["decode_error"] = json!("selector not present in the supplied ABI");
            }
            None => {
                decoded["decode_error"] = json!(format!("unknown selector {}", selector));
            }
        }
    }
    out["decoded"] = decoded;
    Ok(out)
}
