// src/blockchain/services/ens.rs

use ethers::abi::{decode, ParamType, Token};
use ethers::providers::ens::{namehash, ENS_ADDRESS};
use ethers::types::Address;
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::services::token::{encode_call, eth_call};
use crate::error::{ErrorKind, ToolError};
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

const COMMON_TEXT_RECORDS: &[&str] = &["avatar", "url", "description", "com.twitter", "com.github"];

const ALL_TEXT_RECORDS: &[&str] = &[
    "avatar",
    "email",
    "url",
    "description",
    "notice",
    "keywords",
    "com.twitter",
    "com.github",
    "com.discord",
    "com.reddit",
    "org.telegram",
];

/// Text records that fail to resolve are reported as `null`; transport
/// failures still abort the whole call.
async fn text_records(rpc: &dyn EvmRpc, name: &str, keys: &[&str]) -> Result<Map<String, Value>, ToolError> {
    let lookups = keys.iter().map(|key| async move { (*key, rpc.resolve_field(name, key).await) });
    let mut records = Map::new();
    for (key, result) in join_all(lookups).await {
        let value = match result {
            Ok(text) if !text.is_empty() => Value::String(text),
            Ok(_) => Value::Null,
            Err(e) if e.kind.is_transport() || e.kind == ErrorKind::RateLimitExceeded => return Err(e),
            Err(e) => {
                debug!(ens_name = name, key, error = %e, "text record unavailable");
                Value::Null
            }
        };
        records.insert(key.to_string(), value);
    }
    Ok(records)
}

/// Raw `contenthash` bytes via registry -> resolver.
async fn content_hash(rpc: &dyn EvmRpc, name: &str) -> Result<Option<String>, ToolError> {
    let node = namehash(name);
    let raw = eth_call(
        rpc,
        ENS_ADDRESS,
        encode_call("resolver(bytes32)", &[Token::FixedBytes(node.as_bytes().to_vec())]),
    )
    .await?;
    let resolver = match decode(&[ParamType::Address], &raw).ok().and_then(|t| t.into_iter().next()) {
        Some(Token::Address(addr)) if addr != Address::zero() => addr,
        _ => return Ok(None),
    };
    let raw = match eth_call(
        rpc,
        resolver,
        encode_call("contenthash(bytes32)", &[Token::FixedBytes(node.as_bytes().to_vec())]),
    )
    .await
    {
        Ok(raw) => raw,
        // resolvers without the contenthash interface revert
        Err(e) if e.kind == ErrorKind::UpstreamError => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(match decode(&[ParamType::Bytes], &raw).ok().and_then(|t| t.into_iter().next()) {
        Some(Token::Bytes(bytes)) if !bytes.is_empty() => Some(format!("0x{}", hex::encode(bytes))),
        _ => None,
    })
}

/// `resolve_ens_name`
pub async fn resolve_ens_name(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let name = args.str("ens_name")?;
    let address = rpc.resolve_name(name).await?;
    let records = text_records(rpc, name, COMMON_TEXT_RECORDS).await?;
    Ok(json!({
        "ens_name": name,
        "address": checksum(&address),
        "records": records,
        "network": network.name,
    }))
}

/// `reverse_resolve_ens`: primary name plus whether it resolves back.
pub async fn reverse_resolve_ens(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let address = args.address("address")?;
    let name = rpc.lookup_address(address).await.map_err(|e| {
        if e.kind == ErrorKind::NotFound {
            ToolError::not_found(format!("No primary ENS name set for {}", checksum(&address)))
        } else {
            e
        }
    })?;
    let verified = match rpc.resolve_name(&name).await {
        Ok(forward) => forward == address,
        Err(e) if e.kind == ErrorKind::NotFound || e.kind == ErrorKind::UpstreamError => false,
        Err(e) => return Err(e),
    };
    Ok(json!({
        "address": checksum(&address),
        "ens_name": name,
        "forward_verified": verified,
        "network": network.name,
    }))
}

/// `get_ens_records`
pub async fn get_ens_records(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let name = args.str("ens_name")?;
    let address = match rpc.resolve_name(name).await {
        Ok(addr) => Some(checksum(&addr)),
        Err(e) if e.kind == ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };
    let records = text_records(rpc, name, ALL_TEXT_RECORDS).await?;
    let contenthash = content_hash(rpc, name).await?;
    if address.is_none() && contenthash.is_none() && records.values().all(Value::is_null) {
        return Err(ToolError::not_found(format!("ENS name '{}' has no records", name)));
    }
    Ok(json!({
        "ens_name": name,
        "namehash": format!("{:#x}", namehash(name)),
        "address": address,
        "text_records": records,
        "contenthash": contenthash,
        "network": network.name,
    }))
}
