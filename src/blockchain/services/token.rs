// src/blockchain/services/token.rs

use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::units::format_units;
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

pub fn selector(sig: &str) -> [u8; 4] {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&keccak256(sig.as_bytes())[0..4]);
    sel
}

pub fn encode_call(sig: &str, tokens: &[Token]) -> Bytes {
    let mut out = selector(sig).to_vec();
    out.extend(encode(tokens));
    Bytes::from(out)
}

/// Read-only call against `to` at the latest block.
pub async fn eth_call(rpc: &dyn EvmRpc, to: Address, data: Bytes) -> Result<Bytes, ToolError> {
    let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
    rpc.call(&tx).await
}

/// ABI `string`, falling back to a NUL-padded `bytes32` (old tokens like MKR).
pub fn decode_string(bytes: &[u8]) -> Option<String> {
    if let Ok(tokens) = decode(&[ParamType::String], bytes) {
        if let Some(Token::String(s)) = tokens.into_iter().next() {
            return Some(s);
        }
    }
    if let Ok(tokens) = decode(&[ParamType::FixedBytes(32)], bytes) {
        if let Some(Token::FixedBytes(b)) = tokens.into_iter().next() {
            let trimmed: Vec<u8> = b.into_iter().take_while(|c| *c != 0u8).collect();
            return String::from_utf8(trimmed).ok();
        }
    }
    None
}

pub fn decode_u256(bytes: &[u8]) -> Option<U256> {
    match decode(&[ParamType::Uint(256)], bytes).ok()?.into_iter().next() {
        Some(Token::Uint(n)) => Some(n),
        _ => None,
    }
}

async fn call_string(rpc: &dyn EvmRpc, token: Address, sig: &str) -> Result<Option<String>, ToolError> {
    let raw = eth_call(rpc, token, encode_call(sig, &[])).await?;
    Ok(decode_string(&raw))
}

/// `decimals()`; an empty return means the address is not an ERC-20 token.
pub async fn erc20_decimals(rpc: &dyn EvmRpc, token: Address) -> Result<u8, ToolError> {
    let raw = eth_call(rpc, token, encode_call("decimals()", &[])).await?;
    let decimals = decode_u256(&raw).ok_or_else(|| {
        ToolError::not_found(format!(
            "{} does not look like an ERC-20 token (decimals() returned no data)",
            checksum(&token)
        ))
    })?;
    if decimals > U256::from(u8::MAX) {
        return Err(ToolError::upstream(format!(
            "token {} reports an invalid decimals value {}",
            checksum(&token),
            decimals
        )));
    }
    Ok(decimals.as_u32() as u8)
}

pub async fn erc20_symbol(rpc: &dyn EvmRpc, token: Address) -> Result<Option<String>, ToolError> {
    call_string(rpc, token, "symbol()").await
}

pub async fn erc20_balance_of(rpc: &dyn EvmRpc, token: Address, owner: Address) -> Result<U256, ToolError> {
    let raw = eth_call(
        rpc,
        token,
        encode_call("balanceOf(address)", &[Token::Address(owner)]),
    )
    .await?;
    decode_u256(&raw).ok_or_else(|| {
        ToolError::upstream(format!("balanceOf on {} returned no data", checksum(&token)))
    })
}

/// `get_token_metadata`
pub async fn get_token_metadata(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let token = args.address("token_address")?;
    let decimals = erc20_decimals(rpc, token).await?;
    let name = call_string(rpc, token, "name()").await?;
    let symbol = erc20_symbol(rpc, token).await?;
    let supply_raw = eth_call(rpc, token, encode_call("totalSupply()", &[])).await?;
    let total_supply = decode_u256(&supply_raw).map(|supply| {
        json!({
            "raw": supply.to_string(),
            "formatted": format_units(supply, decimals),
        })
    });

    Ok(json!({
        "token_address": checksum(&token),
        "name": name,
        "symbol": symbol,
        "decimals": decimals,
        "total_supply": total_supply,
        "network": network.name,
        "explorer_url": format!("{}/token/{}", network.explorer_url, checksum(&token)),
    }))
}
