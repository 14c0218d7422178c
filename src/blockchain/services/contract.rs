// src/blockchain/services/contract.rs

use std::collections::HashMap;

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{Abi, Event, Function, ParamType, RawLog, Token};
use ethers::types::{
    transaction::eip2718::TypedTransaction, BlockId, BlockNumber, Filter, Log, TransactionRequest, I256, U256,
};
use ethers::utils::keccak256;
use serde_json::{json, Map, Value};

use crate::blockchain::registry::NetworkConfig;
use crate::blockchain::rpc::EvmRpc;
use crate::blockchain::units::{amount_json, gas_price_json};
use crate::error::ToolError;
use crate::mcp::tools::ToolArgs;
use crate::utils::checksum;

/// Widest block span `get_contract_events` will query.
pub const MAX_EVENT_RANGE: u64 = 10_000;
/// Span used when `from_block` is omitted.
pub const DEFAULT_EVENT_LOOKBACK: u64 = 1_000;
const MAX_EVENTS_RETURNED: usize = 1_000;

const ERC20_ABI: &[&str] = &[
    "function name() view returns (string)",
    "function symbol() view returns (string)",
    "function decimals() view returns (uint8)",
    "function totalSupply() view returns (uint256)",
    "function balanceOf(address owner) view returns (uint256)",
    "function allowance(address owner, address spender) view returns (uint256)",
    "function transfer(address to, uint256 amount) returns (bool)",
    "function approve(address spender, uint256 amount) returns (bool)",
    "function transferFrom(address from, address to, uint256 amount) returns (bool)",
    "event Transfer(address indexed from, address indexed to, uint256 value)",
    "event Approval(address indexed owner, address indexed spender, uint256 value)",
];

pub fn erc20_abi() -> Result<Abi, ToolError> {
    ethers::abi::parse_abi(ERC20_ABI)
        .map_err(|e| ToolError::upstream(format!("built-in ERC-20 ABI failed to parse: {}", e)))
}

/// Canonical signature such as `transfer(address,uint256)`.
pub fn function_signature(func: &Function) -> String {
    let types: Vec<String> = func.inputs.iter().map(|p| param_type_to_string(&p.kind)).collect();
    format!("{}({})", func.name, types.join(","))
}

fn param_type_to_string(p: &ParamType) -> String {
    match p {
        ParamType::Address => "address".to_string(),
        ParamType::Bytes => "bytes".to_string(),
        ParamType::FixedBytes(n) => format!("bytes{}", n),
        ParamType::Int(n) => format!("int{}", n),
        ParamType::Uint(n) => format!("uint{}", n),
        ParamType::Bool => "bool".to_string(),
        ParamType::String => "string".to_string(),
        ParamType::Array(inner) => format!("{}[]", param_type_to_string(inner)),
        ParamType::FixedArray(inner, n) => format!("{}[{}]", param_type_to_string(inner), n),
        ParamType::Tuple(components) => {
            let inner: Vec<String> = components.iter().map(param_type_to_string).collect();
            format!("({})", inner.join(","))
        }
    }
}

/// Turn one JSON argument into an ABI token of type `kind`.
fn coerce_token(kind: &ParamType, value: &Value) -> Result<Token, ToolError> {
    let mismatch = |why: &str| {
        ToolError::validation(format!(
            "argument {} does not fit type {}: {}",
            value,
            param_type_to_string(kind),
            why
        ))
    };
    match (kind, value) {
        (ParamType::Array(inner), Value::Array(items)) => Ok(Token::Array(
            items.iter().map(|v| coerce_token(inner, v)).collect::<Result<_, _>>()?,
        )),
        (ParamType::FixedArray(inner, n), Value::Array(items)) => {
            if items.len() != *n {
                return Err(mismatch("wrong number of elements"));
            }
            Ok(Token::FixedArray(
                items.iter().map(|v| coerce_token(inner, v)).collect::<Result<_, _>>()?,
            ))
        }
        (ParamType::Tuple(components), Value::Array(items)) => {
            if items.len() != components.len() {
                return Err(mismatch("wrong number of tuple fields"));
            }
            Ok(Token::Tuple(
                components
                    .iter()
                    .zip(items)
                    .map(|(k, v)| coerce_token(k, v))
                    .collect::<Result<_, _>>()?,
            ))
        }
        (ParamType::Array(_) | ParamType::FixedArray(..) | ParamType::Tuple(_), _) => {
            Err(mismatch("expected a JSON array"))
        }
        (_, Value::String(s)) => LenientTokenizer::tokenize(kind, s).map_err(|e| mismatch(&e.to_string())),
        (_, Value::Number(n)) => {
            LenientTokenizer::tokenize(kind, &n.to_string()).map_err(|e| mismatch(&e.to_string()))
        }
        (_, Value::Bool(b)) => {
            LenientTokenizer::tokenize(kind, &b.to_string()).map_err(|e| mismatch(&e.to_string()))
        }
        _ => Err(mismatch("unsupported JSON value")),
    }
}

pub fn coerce_tokens(func: &Function, args: &[Value]) -> Result<Vec<Token>, ToolError> {
    if func.inputs.len() != args.len() {
        return Err(ToolError::validation(format!(
            "{} expects {} arguments, got {}",
            function_signature(func),
            func.inputs.len(),
            args.len()
        )));
    }
    func.inputs
        .iter()
        .zip(args)
        .map(|(param, value)| coerce_token(&param.kind, value))
        .collect()
}

/// JSON rendering of a decoded token. Integers become decimal strings.
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(a) => Value::String(checksum(a)),
        Token::Uint(n) => Value::String(n.to_string()),
        Token::Int(n) => Value::String(I256::from_raw(*n).to_string()),
        Token::Bool(b) => Value::Bool(*b),
        Token::String(s) => Value::String(s.clone()),
        Token::Bytes(b) | Token::FixedBytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        Token::Array(items) | Token::FixedArray(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

/// Name decoded tokens after their parameters; unnamed ones get their index.
fn named_tokens<'a>(names: impl Iterator<Item = &'a str>, tokens: &[Token]) -> Value {
    let mut out = Map::new();
    for (i, (name, token)) in names.zip(tokens).enumerate() {
        let key = if name.is_empty() { i.to_string() } else { name.to_string() };
        out.insert(key, token_to_json(token));
    }
    Value::Object(out)
}

pub fn decode_function_input(func: &Function, calldata: &[u8]) -> Result<Value, ToolError> {
    let body = calldata.get(4..).unwrap_or_default();
    let tokens = func.decode_input(body)?;
    Ok(named_tokens(func.inputs.iter().map(|p| p.name.as_str()), &tokens))
}

fn select_function<'a>(abi: &'a Abi, name: &str, arg_count: usize) -> Result<&'a Function, ToolError> {
    let overloads = abi
        .functions_by_name(name)
        .map_err(|_| ToolError::validation(format!("function '{}' not found in ABI", name)))?;
    overloads
        .iter()
        .find(|f| f.inputs.len() == arg_count)
        .or_else(|| overloads.first())
        .ok_or_else(|| ToolError::validation(format!("function '{}' not found in ABI", name)))
}

fn call_args(args: &ToolArgs) -> Vec<Value> {
    args.opt_array("args").cloned().unwrap_or_default()
}

/// `read_contract`
pub async fn read_contract(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let contract = args.address("contract_address")?;
    let function_name = args.str("function_name")?;
    let abi = match args.opt_abi("abi")? {
        Some(abi) => abi,
        None => erc20_abi()?,
    };
    let values = call_args(args);
    let func = select_function(&abi, function_name, values.len())?;
    let tokens = coerce_tokens(func, &values)?;
    let data = func.encode_input(&tokens)?;

    let tx: TypedTransaction = TransactionRequest::new().to(contract).data(data).into();
    let raw = rpc.call(&tx).await?;
    if raw.is_empty() && !func.outputs.is_empty() {
        return Err(ToolError::upstream(format!(
            "call to {} returned no data; is {} a contract implementing it?",
            function_signature(func),
            checksum(&contract)
        )));
    }
    let outputs = func
        .decode_output(&raw)
        .map_err(|e| ToolError::upstream(format!("could not decode return data: {}", e)))?;
    let result = match outputs.as_slice() {
        [single] => token_to_json(single),
        many => named_tokens(func.outputs.iter().map(|p| p.name.as_str()), many),
    };

    Ok(json!({
        "contract_address": checksum(&contract),
        "function": function_signature(func),
        "args": values,
        "result": result,
        "raw": format!("0x{}", hex::encode(&raw)),
        "network": network.name,
    }))
}

/// `get_contract_info`
pub async fn get_contract_info(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let address = args.address("contract_address")?;
    let code = rpc.get_code(address, None).await?;
    if code.is_empty() {
        return Err(ToolError::not_found(format!(
            "No contract deployed at {} on {}",
            checksum(&address),
            network.name
        )));
    }
    let balance = rpc.get_balance(address, None).await?;
    Ok(json!({
        "contract_address": checksum(&address),
        "network": network.name,
        "is_contract": true,
        "code_size": code.len(),
        "code_hash": format!("0x{}", hex::encode(keccak256(&code))),
        "balance": amount_json(balance, &network.native_token_symbol),
        "explorer_url": format!("{}/address/{}", network.explorer_url, checksum(&address)),
    }))
}

/// `estimate_contract_gas`
pub async fn estimate_contract_gas(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let contract = args.address("contract_address")?;
    let from = args.address("from_address")?;
    let function_name = args.str("function_name")?;
    let value = args.opt_wei("value")?.unwrap_or_default();
    let abi = match args.opt_abi("abi")? {
        Some(abi) => abi,
        None => erc20_abi()?,
    };
    let values = call_args(args);
    let func = select_function(&abi, function_name, values.len())?;
    let data = func.encode_input(&coerce_tokens(func, &values)?)?;

    let tx: TypedTransaction = TransactionRequest::new()
        .from(from)
        .to(contract)
        .value(value)
        .data(data)
        .into();
    let gas = rpc.estimate_gas(&tx).await?;
    let gas_price = rpc.gas_price().await?;
    let cost = gas.saturating_mul(gas_price);

    Ok(json!({
        "contract_address": checksum(&contract),
        "from": checksum(&from),
        "function": function_signature(func),
        "gas_estimate": gas.to_string(),
        "gas_price": gas_price_json(gas_price),
        "estimated_cost": amount_json(cost, &network.native_token_symbol),
        "value": amount_json(value, &network.native_token_symbol),
        "network": network.name,
    }))
}

pub(crate) async fn resolve_block(
    rpc: &dyn EvmRpc,
    id: Option<BlockId>,
    latest: &mut Option<u64>,
) -> Result<Option<u64>, ToolError> {
    match id {
        None => Ok(None),
        Some(BlockId::Number(BlockNumber::Number(n))) => Ok(Some(n.as_u64())),
        Some(BlockId::Number(BlockNumber::Earliest)) => Ok(Some(0)),
        Some(_) => {
            if latest.is_none() {
                *latest = Some(rpc.block_number().await?.as_u64());
            }
            Ok(*latest)
        }
    }
}

fn decode_log(events: &HashMap<ethers::types::H256, &Event>, log: &Log) -> Value {
    let mut out = json!({
        "address": checksum(&log.address),
        "block_number": log.block_number.map(|n| n.as_u64()),
        "transaction_hash": log.transaction_hash.map(|h| format!("{:#x}", h)),
        "log_index": log.log_index.map(|i| i.to_string()),
        "topics": log.topics.iter().map(|t| format!("{:#x}", t)).collect::<Vec<_>>(),
        "data": format!("0x{}", hex::encode(&log.data)),
    });
    let Some(event) = log.topics.first().and_then(|t| events.get(t)) else {
        return out;
    };
    out["event"] = Value::String(event.name.clone());
    match event.parse_log(RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    }) {
        Ok(parsed) => {
            let params: Map<String, Value> = parsed
                .params
                .iter()
                .map(|p| (p.name.clone(), token_to_json(&p.value)))
                .collect();
            out["args"] = Value::Object(params);
        }
        Err(e) => {
            out["decode_error"] = Value::String(e.to_string());
        }
    }
    out
}

/// `get_contract_events`
pub async fn get_contract_events(
    rpc: &dyn EvmRpc,
    network: &NetworkConfig,
    args: &ToolArgs,
) -> Result<Value, ToolError> {
    let contract = args.address("contract_address")?;
    let abi = match args.opt_abi("abi")? {
        Some(abi) => abi,
        None => erc20_abi()?,
    };
    let event_name = args.opt_str("event_name");
    let selected = match event_name {
        Some(name) => Some(abi.event(name).map_err(|_| {
            ToolError::validation(format!("event '{}' not found in ABI", name))
        })?),
        None => None,
    };

    let mut latest = None;
    let to_block = match resolve_block(rpc, args.opt_block_id("to_block")?, &mut latest).await? {
        Some(n) => n,
        None => {
            if latest.is_none() {
                latest = Some(rpc.block_number().await?.as_u64());
            }
            latest.unwrap_or_default()
        }
    };
    let from_block = resolve_block(rpc, args.opt_block_id("from_block")?, &mut latest)
        .await?
        .unwrap_or_else(|| to_block.saturating_sub(DEFAULT_EVENT_LOOKBACK));
    if from_block > to_block {
        return Err(ToolError::validation(format!(
            "from_block {} is after to_block {}",
            from_block, to_block
        )));
    }
    if to_block - from_block > MAX_EVENT_RANGE {
        return Err(ToolError::validation(format!(
            "block range too large: {} blocks (max {})",
            to_block - from_block,
            MAX_EVENT_RANGE
        )));
    }

    let mut filter = Filter::new()
        .address(contract)
        .from_block(from_block)
        .to_block(to_block);
    if let Some(event) = selected {
        filter = filter.topic0(event.signature());
    }
    let logs = rpc.get_logs(&filter).await?;

    let events: HashMap<_, _> = abi.events().map(|e| (e.signature(), e)).collect();
    let total = logs.len();
    let decoded: Vec<Value> = logs
        .iter()
        .rev()
        .take(MAX_EVENTS_RETURNED)
        .map(|log| decode_log(&events, log))
        .collect();

    Ok(json!({
        "contract_address": checksum(&contract),
        "event_name": event_name,
        "from_block": from_block,
        "to_block": to_block,
        "total_events": total,
        "truncated": total > MAX_EVENTS_RETURNED,
        "events": decoded,
        "network": network.name,
    }))
}

/// Overflow-safe fee: `gas * price`.
pub fn fee(gas: U256, price: U256) -> U256 {
    gas.saturating_mul(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_abi_parses() {
        let abi = erc20_abi().unwrap();
        let f = abi.function("balanceOf").unwrap();
        assert_eq!(function_signature(f), "balanceOf(address)");
        assert!(abi.event("Transfer").is_ok());
    }

    #[test]
    fn coerces_json_arguments() {
        let abi = erc20_abi().unwrap();
        let f = abi.function("transfer").unwrap();
        let tokens = coerce_tokens(
            f,
            &[json!("0x0000000000000000000000000000000000000001"), json!(1000)],
        )
        .unwrap();
        assert_eq!(tokens[1], Token::Uint(U256::from(1000u64)));
        assert!(coerce_tokens(f, &[json!("0x01")]).is_err());
    }

    #[test]
    fn renders_tokens() {
        assert_eq!(token_to_json(&Token::Uint(U256::from(7u64))), json!("7"));
        assert_eq!(
            token_to_json(&Token::Int(I256::from(-3i64).into_raw())),
            json!("-3")
        );
        assert_eq!(token_to_json(&Token::Bytes(vec![0xab])), json!("0xab"));
    }

    #[test]
    fn decodes_transfer_calldata() {
        let abi = erc20_abi().unwrap();
        let f = abi.function("transfer").unwrap();
        let to = "0x000000000000000000000000000000000000dEaD";
        let data = f
            .encode_input(&coerce_tokens(f, &[json!(to), json!("5")]).unwrap())
            .unwrap();
        let decoded = decode_function_input(f, &data).unwrap();
        assert_eq!(decoded["to"], json!(to));
        assert_eq!(decoded["amount"], json!("5"));
    }
}
