// src/blockchain/services/account.rs

use serde_json::{json, Value};

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::services::token::{erc20_balance_of, erc20_decimals, erc20_symbol};
use crate::blockchain::units::{amount_json, format_units};
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

/// `get_balance`: native balance at the latest block.
pub async fn get_balance(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let address = args.address("address")?;
    let wei = rpc.get_balance(address, None).await?;
    Ok(json!({
        "address": checksum(&address),
        "network": network.name,
        "balance": amount_json(wei, &network.native_token_symbol),
    }))
}

/// `get_token_balance`
pub async fn get_token_balance(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let owner = args.address("address")?;
    let token = args.address("token_address")?;
    let decimals = erc20_decimals(rpc, token).await?;
    let raw = erc20_balance_of(rpc, token, owner).await?;
    let symbol = erc20_symbol(rpc, token).await?;
    let formatted = format_units(raw, decimals);

    Ok(json!({
        "address": checksum(&owner),
        "token_address": checksum(&token),
        "network": network.name,
        "balance": {
            "raw": raw.to_string(),
            "decimals": decimals,
            "symbol": symbol,
            "formatted": match &symbol {
                Some(sym) => format!("{} {}", formatted, sym),
                None => formatted.clone(),
            },
            "amount": formatted,
        },
    }))
}

/// `get_account_info`: balance, nonce and whether code is deployed.
pub async fn get_account_info(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let address = args.address("address")?;
    let wei = rpc.get_balance(address, None).await?;
    let nonce = rpc.get_transaction_count(address, None).await?;
    let code = rpc.get_code(address, None).await?;
    let is_contract = !code.is_empty();

    Ok(json!({
        "address": checksum(&address),
        "network": network.name,
        "balance": amount_json(wei, &network.native_token_symbol),
        "nonce": nonce.to_string(),
        "is_contract": is_contract,
        "account_type": if is_contract { "contract" } else { "externally_owned" },
        "code_size": code.len(),
        "explorer_url": format!("{}/address/{}", network.explorer_url, checksum(&address)),
    }))
}
