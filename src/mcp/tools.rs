//! # Tool table
//!
//! The static description of every tool: argument schema, network scope,
//! capability requirement and cache TTL class. Argument validation and the
//! `tools/list` JSON schema are both derived from this table, so the two
//! never drift apart.

use std::str::FromStr;

use ethers::abi::Abi;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, H256, U256};
use serde_json::{json, Map, Value};

use crate::blockchain::registry::Capability;
use crate::blockchain::units::{self, Unit};
use crate::cache::TtlClass;
use crate::error::ToolError;
use crate::utils::{hex_to_bytes, is_hex, lower_hex_address, parse_address, parse_tx_hash, strip_hex_prefix};

/// How a tool relates to the `network` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkScope {
    /// Runs on one network; the default network applies when omitted.
    Required,
    /// Runs on the named network, or on all networks when omitted.
    Optional,
    /// No network involved.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Address,
    TxHash,
    /// Number, block hash or tag.
    BlockIdentifier,
    /// Number or tag, no hashes.
    BlockNumber,
    Text,
    Count { min: u64, max: u64 },
    /// JSON integer is wei; a string is a decimal ether amount.
    EtherAmount,
    /// Integer wei, as a JSON integer or decimal string.
    WeiAmount,
    /// Decimal number whose precision depends on a unit given elsewhere.
    Decimal,
    Unit,
    EnsName,
    Abi,
    JsonArray,
    HexData,
    Bool,
}

impl ArgKind {
    fn schema(&self) -> Value {
        match self {
            ArgKind::Address | ArgKind::TxHash | ArgKind::Text | ArgKind::EnsName | ArgKind::HexData => {
                json!({"type": "string"})
            }
            ArgKind::Unit => json!({"type": "string", "enum": ["wei", "gwei", "ether"]}),
            ArgKind::BlockIdentifier | ArgKind::BlockNumber => json!({"type": ["string", "integer"]}),
            ArgKind::Count { min, max } => json!({"type": "integer", "minimum": min, "maximum": max}),
            ArgKind::EtherAmount | ArgKind::WeiAmount => json!({"type": ["string", "integer"]}),
            ArgKind::Decimal => json!({"type": ["string", "number"]}),
            ArgKind::Abi => json!({"type": ["string", "array"]}),
            ArgKind::JsonArray => json!({"type": "array"}),
            ArgKind::Bool => json!({"type": "boolean"}),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArgDef {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub description: &'static str,
    /// Alternative spellings accepted on input.
    pub aliases: &'static [&'static str],
}

const fn arg(name: &'static str, kind: ArgKind, description: &'static str) -> ArgDef {
    ArgDef {
        name,
        kind,
        required: true,
        description,
        aliases: &[],
    }
}

const fn opt(name: &'static str, kind: ArgKind, description: &'static str) -> ArgDef {
    ArgDef {
        name,
        kind,
        required: false,
        description,
        aliases: &[],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    GetBalance,
    GetTokenBalance,
    GetAccountInfo,
    GetTokenMetadata,
    GetTokenPrice,
    SearchTokens,
    GetTransaction,
    GetTransactionReceipt,
    EstimateGas,
    DecodeTransactionInput,
    GetBlock,
    GetLatestBlocks,
    AnalyzeBlockRange,
    ReadContract,
    GetContractInfo,
    EstimateContractGas,
    GetContractEvents,
    ResolveEnsName,
    ReverseResolveEns,
    GetEnsRecords,
    GetSupportedNetworks,
    GetNetworkStatus,
    GetGasPrice,
    ConvertUnits,
    ValidateAddress,
}

#[derive(Debug, Clone, Copy)]
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
    pub args: &'static [ArgDef],
    pub capability: Option<Capability>,
    pub ttl: TtlClass,
    pub scope: NetworkScope,
}

pub const MAX_LATEST_BLOCKS: u64 = 20;
pub const MAX_SEARCH_RESULTS: u64 = 50;

const ADDRESS: ArgDef = arg("address", ArgKind::Address, "0x-prefixed account address");
const TOKEN_ADDRESS: ArgDef = arg("token_address", ArgKind::Address, "ERC-20 token contract address");
const CONTRACT_ADDRESS: ArgDef = arg("contract_address", ArgKind::Address, "Contract address");
const TX_HASH: ArgDef = arg("tx_hash", ArgKind::TxHash, "Transaction hash (0x + 64 hex)");
const ENS_NAME: ArgDef = arg("ens_name", ArgKind::EnsName, "ENS name, e.g. vitalik.eth");
const FUNCTION_NAME: ArgDef = arg("function_name", ArgKind::Text, "Contract function name");
const ABI: ArgDef = opt("abi", ArgKind::Abi, "Contract ABI (JSON array or string); defaults to ERC-20");
const CALL_ARGS: ArgDef = opt("args", ArgKind::JsonArray, "Function arguments in ABI order");

pub static TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "get_balance",
        description: "Get the native token balance of an address.",
        kind: ToolKind::GetBalance,
        args: &[ADDRESS],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_token_balance",
        description: "Get the ERC-20 token balance of an address.",
        kind: ToolKind::GetTokenBalance,
        args: &[ADDRESS, TOKEN_ADDRESS],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_account_info",
        description: "Get balance, nonce and contract status of an address.",
        kind: ToolKind::GetAccountInfo,
        args: &[ADDRESS],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_token_metadata",
        description: "Get ERC-20 name, symbol, decimals and total supply.",
        kind: ToolKind::GetTokenMetadata,
        args: &[TOKEN_ADDRESS],
        capability: None,
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_token_price",
        description: "Get the current market price of a token by symbol.",
        kind: ToolKind::GetTokenPrice,
        args: &[
            arg("token_symbol", ArgKind::Text, "Token symbol or CoinGecko id, e.g. ETH"),
            opt("vs_currency", ArgKind::Text, "Quote currency (default usd)"),
        ],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Global,
    },
    ToolDef {
        name: "search_tokens",
        description: "Search tokens by name or symbol.",
        kind: ToolKind::SearchTokens,
        args: &[
            arg("query", ArgKind::Text, "Search text"),
            opt(
                "limit",
                ArgKind::Count { min: 1, max: MAX_SEARCH_RESULTS },
                "Maximum results (default 10)",
            ),
        ],
        capability: None,
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Global,
    },
    ToolDef {
        name: "get_transaction",
        description: "Get transaction details by hash, including receipt data when mined.",
        kind: ToolKind::GetTransaction,
        args: &[TX_HASH],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_transaction_receipt",
        description: "Get the receipt of a mined transaction.",
        kind: ToolKind::GetTransactionReceipt,
        args: &[TX_HASH],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "estimate_gas",
        description: "Estimate gas and fee for a transaction.",
        kind: ToolKind::EstimateGas,
        args: &[
            ArgDef {
                name: "from_address",
                kind: ArgKind::Address,
                required: true,
                description: "Sender address",
                aliases: &["from"],
            },
            ArgDef {
                name: "to_address",
                kind: ArgKind::Address,
                required: false,
                description: "Recipient address",
                aliases: &["to"],
            },
            opt("value", ArgKind::EtherAmount, "Value: string in ether, or integer wei"),
            opt("data", ArgKind::HexData, "Call data (0x...)"),
        ],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "decode_transaction_input",
        description: "Decode the input data of a transaction.",
        kind: ToolKind::DecodeTransactionInput,
        args: &[TX_HASH, opt("abi", ArgKind::Abi, "ABI used to decode the call")],
        capability: None,
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_block",
        description: "Get a block by number, hash or tag.",
        kind: ToolKind::GetBlock,
        args: &[
            ArgDef {
                name: "block_identifier",
                kind: ArgKind::BlockIdentifier,
                required: true,
                description: "Block number, hash, or latest/earliest/pending/safe/finalized",
                aliases: &["block"],
            },
            opt("full_transactions", ArgKind::Bool, "Include full transaction objects"),
        ],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_latest_blocks",
        description: "Get the most recent blocks.",
        kind: ToolKind::GetLatestBlocks,
        args: &[opt(
            "count",
            ArgKind::Count { min: 1, max: MAX_LATEST_BLOCKS },
            "Number of blocks (default 5, max 20)",
        )],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "analyze_block_range",
        description: "Aggregate transaction, gas and timing statistics over a block range.",
        kind: ToolKind::AnalyzeBlockRange,
        args: &[
            arg("start_block", ArgKind::BlockNumber, "First block (inclusive)"),
            arg("end_block", ArgKind::BlockNumber, "Last block (inclusive)"),
        ],
        capability: None,
        ttl: TtlClass::Long,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "read_contract",
        description: "Call a read-only contract function.",
        kind: ToolKind::ReadContract,
        args: &[CONTRACT_ADDRESS, FUNCTION_NAME, CALL_ARGS, ABI],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_contract_info",
        description: "Get code size, code hash and balance of a contract.",
        kind: ToolKind::GetContractInfo,
        args: &[CONTRACT_ADDRESS],
        capability: None,
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "estimate_contract_gas",
        description: "Estimate gas for a contract function call.",
        kind: ToolKind::EstimateContractGas,
        args: &[
            CONTRACT_ADDRESS,
            FUNCTION_NAME,
            arg("from_address", ArgKind::Address, "Caller address"),
            CALL_ARGS,
            ABI,
            opt("value", ArgKind::WeiAmount, "Value sent with the call, in wei"),
        ],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_contract_events",
        description: "Get event logs emitted by a contract.",
        kind: ToolKind::GetContractEvents,
        args: &[
            CONTRACT_ADDRESS,
            opt("event_name", ArgKind::Text, "Event name to filter by (needs the ABI)"),
            opt("from_block", ArgKind::BlockNumber, "First block (default latest - 1000)"),
            opt("to_block", ArgKind::BlockNumber, "Last block (default latest)"),
            ABI,
        ],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "resolve_ens_name",
        description: "Resolve an ENS name to an address.",
        kind: ToolKind::ResolveEnsName,
        args: &[ENS_NAME],
        capability: Some(Capability::Ens),
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "reverse_resolve_ens",
        description: "Find the primary ENS name of an address.",
        kind: ToolKind::ReverseResolveEns,
        args: &[ADDRESS],
        capability: Some(Capability::Ens),
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_ens_records",
        description: "Get the address and text records of an ENS name.",
        kind: ToolKind::GetEnsRecords,
        args: &[ENS_NAME],
        capability: Some(Capability::Ens),
        ttl: TtlClass::Metadata,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "get_supported_networks",
        description: "List the supported networks.",
        kind: ToolKind::GetSupportedNetworks,
        args: &[],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Global,
    },
    ToolDef {
        name: "get_network_status",
        description: "Get chain id, latest block, gas price and connection health; all networks when none is given.",
        kind: ToolKind::GetNetworkStatus,
        args: &[],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Optional,
    },
    ToolDef {
        name: "get_gas_price",
        description: "Get the current gas price and EIP-1559 fee suggestions.",
        kind: ToolKind::GetGasPrice,
        args: &[],
        capability: None,
        ttl: TtlClass::Short,
        scope: NetworkScope::Required,
    },
    ToolDef {
        name: "convert_units",
        description: "Convert an amount between wei, gwei and ether.",
        kind: ToolKind::ConvertUnits,
        args: &[
            arg("amount", ArgKind::Decimal, "Amount to convert"),
            arg("from_unit", ArgKind::Unit, "Source unit"),
            arg("to_unit", ArgKind::Unit, "Target unit"),
        ],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Global,
    },
    ToolDef {
        name: "validate_address",
        description: "Validate an address and return its checksum form.",
        kind: ToolKind::ValidateAddress,
        args: &[arg("address", ArgKind::Text, "Address to validate")],
        capability: None,
        ttl: TtlClass::None,
        scope: NetworkScope::Global,
    },
];

pub fn find(name: &str) -> Option<&'static ToolDef> {
    TOOLS.iter().find(|t| t.name == name)
}

/// `tools/list` entry for one tool.
pub fn tool_schema(def: &ToolDef, network_names: &[String]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for a in def.args {
        let mut schema = a.kind.schema();
        if let Value::Object(map) = &mut schema {
            map.insert("description".into(), Value::String(a.description.to_string()));
        }
        properties.insert(a.name.to_string(), schema);
        if a.required {
            required.push(Value::String(a.name.to_string()));
        }
    }
    if def.scope != NetworkScope::Global {
        let description = match def.scope {
            NetworkScope::Optional => "Network name; all networks when omitted",
            _ => "Network name (defaults to the configured default network)",
        };
        properties.insert(
            "network".into(),
            json!({"type": "string", "description": description, "examples": network_names}),
        );
    }
    json!({
        "name": def.name,
        "description": def.description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

pub fn list_tools(network_names: &[String]) -> Vec<Value> {
    TOOLS.iter().map(|t| tool_schema(t, network_names)).collect()
}

/// Arguments after validation: every value is in canonical form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
    network: Option<String>,
}

fn missing(key: &str) -> ToolError {
    ToolError::validation(format!("Missing or invalid required argument: '{}'", key))
}

impl ToolArgs {
    /// Canonical argument map, used for cache keys.
    pub fn canonical(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn with_network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn str(&self, key: &str) -> Result<&str, ToolError> {
        self.opt_str(key).ok_or_else(|| missing(key))
    }

    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn address(&self, key: &str) -> Result<Address, ToolError> {
        parse_address(self.str(key)?)
    }

    pub fn opt_address(&self, key: &str) -> Result<Option<Address>, ToolError> {
        self.opt_str(key).map(parse_address).transpose()
    }

    pub fn tx_hash(&self, key: &str) -> Result<H256, ToolError> {
        parse_tx_hash(self.str(key)?)
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.values.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Wei amount stored as a decimal string.
    pub fn opt_wei(&self, key: &str) -> Result<Option<U256>, ToolError> {
        self.opt_str(key)
            .map(|s| {
                U256::from_dec_str(s)
                    .map_err(|_| ToolError::validation(format!("Invalid amount for '{}'", key)))
            })
            .transpose()
    }

    pub fn unit(&self, key: &str) -> Result<Unit, ToolError> {
        Ok(self.str(key)?.parse::<Unit>()?)
    }

    pub fn opt_bytes(&self, key: &str) -> Result<Option<Bytes>, ToolError> {
        self.opt_str(key)
            .map(|s| hex_to_bytes(s).map(Bytes::from))
            .transpose()
    }

    pub fn opt_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.values.get(key).and_then(Value::as_array)
    }

    pub fn opt_abi(&self, key: &str) -> Result<Option<Abi>, ToolError> {
        self.values.get(key).map(abi_from_value).transpose()
    }

    pub fn block_id(&self, key: &str) -> Result<BlockId, ToolError> {
        self.opt_block_id(key)?.ok_or_else(|| missing(key))
    }

    pub fn opt_block_id(&self, key: &str) -> Result<Option<BlockId>, ToolError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        let id = match value {
            Value::Number(n) => n
                .as_u64()
                .map(|n| BlockId::Number(BlockNumber::Number(n.into())))
                .ok_or_else(|| missing(key))?,
            Value::String(s) if s.starts_with("0x") => {
                BlockId::Hash(H256::from_str(&s[2..]).map_err(|_| missing(key))?)
            }
            Value::String(s) => BlockId::Number(block_tag(s).ok_or_else(|| missing(key))?),
            _ => return Err(missing(key)),
        };
        Ok(Some(id))
    }
}

fn block_tag(tag: &str) -> Option<BlockNumber> {
    match tag {
        "latest" => Some(BlockNumber::Latest),
        "earliest" => Some(BlockNumber::Earliest),
        "pending" => Some(BlockNumber::Pending),
        "safe" => Some(BlockNumber::Safe),
        "finalized" => Some(BlockNumber::Finalized),
        _ => None,
    }
}

/// Parse an ABI given either as JSON (array or string containing JSON) or as
/// human-readable signatures (`["function balanceOf(address) view returns (uint256)"]`).
pub fn abi_from_value(value: &Value) -> Result<Abi, ToolError> {
    let parsed = match value {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map_err(|e| ToolError::validation(format!("Invalid ABI JSON: {}", e)))?,
        other => other.clone(),
    };
    let items = parsed
        .as_array()
        .ok_or_else(|| ToolError::validation("ABI must be a JSON array"))?;
    if !items.is_empty() && items.iter().all(Value::is_string) {
        let signatures: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        return ethers::abi::parse_abi(&signatures)
            .map_err(|e| ToolError::validation(format!("Invalid ABI: {}", e)));
    }
    serde_json::from_value::<Abi>(parsed)
        .map_err(|e| ToolError::validation(format!("Invalid ABI: {}", e)))
}

fn invalid(key: &str, why: impl std::fmt::Display) -> ToolError {
    ToolError::validation(format!("Invalid argument '{}': {}", key, why))
}

fn as_text(key: &str, value: &Value) -> Result<String, ToolError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err(invalid(key, "must not be empty")),
        _ => Err(invalid(key, "expected a string")),
    }
}

fn as_integer(key: &str, value: &Value) -> Result<u64, ToolError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(key, "expected a non-negative integer")),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).map_err(|_| invalid(key, "expected an integer"))
            } else {
                s.parse::<u64>().map_err(|_| invalid(key, "expected an integer"))
            }
        }
        _ => Err(invalid(key, "expected an integer")),
    }
}

fn normalize_block(key: &str, value: &Value, allow_hash: bool) -> Result<Value, ToolError> {
    if let Value::String(s) = value {
        let s = s.trim().to_lowercase();
        if block_tag(&s).is_some() {
            return Ok(Value::String(s));
        }
        let body = strip_hex_prefix(&s);
        if s.starts_with("0x") && body.len() == 64 && is_hex(body) {
            return if allow_hash {
                Ok(Value::String(format!("0x{}", body)))
            } else {
                Err(invalid(key, "block hashes are not accepted here"))
            };
        }
    }
    as_integer(key, value)
        .map(|n| json!(n))
        .map_err(|_| invalid(key, "expected a block number, hash or tag (latest, earliest, pending, safe, finalized)"))
}

fn normalize_arg(def: &ArgDef, value: &Value) -> Result<Value, ToolError> {
    let key = def.name;
    let out = match def.kind {
        ArgKind::Address => {
            let address = parse_address(&as_text(key, value)?)
                .map_err(|e| invalid(key, e.message))?;
            Value::String(lower_hex_address(&address))
        }
        ArgKind::TxHash => {
            let hash = parse_tx_hash(&as_text(key, value)?).map_err(|e| invalid(key, e.message))?;
            Value::String(format!("{:#x}", hash))
        }
        ArgKind::BlockIdentifier => normalize_block(key, value, true)?,
        ArgKind::BlockNumber => normalize_block(key, value, false)?,
        ArgKind::Text => Value::String(as_text(key, value)?),
        ArgKind::Count { min, max } => {
            let n = as_integer(key, value)?;
            if n < min || n > max {
                return Err(invalid(key, format!("must be between {} and {}", min, max)));
            }
            json!(n)
        }
        ArgKind::EtherAmount => {
            let wei = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid(key, "integer wei amount expected"))?,
                Value::String(s) => units::to_wei(s).map_err(|e| invalid(key, e))?,
                _ => return Err(invalid(key, "expected an ether string or integer wei")),
            };
            Value::String(wei.to_string())
        }
        ArgKind::WeiAmount => {
            let wei = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| invalid(key, "integer wei amount expected"))?,
                Value::String(s) => units::parse_amount(s, Unit::Wei).map_err(|e| invalid(key, e))?,
                _ => return Err(invalid(key, "expected an integer wei amount")),
            };
            Value::String(wei.to_string())
        }
        ArgKind::Decimal => match value {
            Value::Number(n) => Value::String(n.to_string()),
            Value::String(_) => Value::String(as_text(key, value)?),
            _ => return Err(invalid(key, "expected a number")),
        },
        ArgKind::Unit => {
            let unit = as_text(key, value)?
                .parse::<Unit>()
                .map_err(|e| invalid(key, e))?;
            Value::String(unit.as_str().to_string())
        }
        ArgKind::EnsName => {
            let name = as_text(key, value)?.to_lowercase();
            if !name.contains('.')
                || name.starts_with('.')
                || name.ends_with('.')
                || name.contains(char::is_whitespace)
            {
                return Err(invalid(key, "expected an ENS name such as vitalik.eth"));
            }
            Value::String(name)
        }
        ArgKind::Abi => {
            // parse eagerly so malformed ABIs fail before any I/O
            abi_from_value(value)?;
            match value {
                Value::String(s) => serde_json::from_str::<Value>(s).map_err(|e| invalid(key, e))?,
                other => other.clone(),
            }
        }
        ArgKind::JsonArray => match value {
            Value::Array(_) => value.clone(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Array(_)) => v,
                _ => return Err(invalid(key, "expected a JSON array")),
            },
            _ => return Err(invalid(key, "expected a JSON array")),
        },
        ArgKind::HexData => {
            let text = as_text(key, value)?;
            let bytes = hex_to_bytes(&text).map_err(|e| invalid(key, e.message))?;
            Value::String(format!("0x{}", hex::encode(bytes)))
        }
        ArgKind::Bool => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => return Err(invalid(key, "expected a boolean")),
        },
    };
    Ok(out)
}

/// Check and normalize raw arguments against the tool's schema.
pub fn validate(def: &ToolDef, raw: &Value) -> Result<ToolArgs, ToolError> {
    let empty = Map::new();
    let object = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err(ToolError::validation("Arguments must be a JSON object")),
    };

    let network = match object.get("network") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => return Err(ToolError::validation("Argument 'network' must be a string")),
    };

    let mut values = Map::new();
    for arg in def.args {
        let value = std::iter::once(arg.name)
            .chain(arg.aliases.iter().copied())
            .find_map(|k| object.get(k).filter(|v| !v.is_null()));
        match value {
            Some(v) => {
                values.insert(arg.name.to_string(), normalize_arg(arg, v)?);
            }
            None if arg.required => return Err(missing(arg.name)),
            None => {}
        }
    }

    Ok(ToolArgs {
        values,
        network: if def.scope == NetworkScope::Global {
            None
        } else {
            network
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_is_listed_once() {
        assert_eq!(TOOLS.len(), 25);
        for tool in TOOLS {
            assert_eq!(TOOLS.iter().filter(|t| t.name == tool.name).count(), 1);
        }
    }

    #[test]
    fn address_forms_normalize_identically() {
        let def = find("get_balance").unwrap();
        let a = validate(def, &json!({"address": "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"})).unwrap();
        let b = validate(def, &json!({"address": "0xD8DA6BF26964AF9D7EED9E03E53415D37AA96045"})).unwrap();
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn aliases_and_missing_args() {
        let def = find("estimate_gas").unwrap();
        let args = validate(
            def,
            &json!({"from": "0x0000000000000000000000000000000000000001", "value": "0.5"}),
        )
        .unwrap();
        assert_eq!(args.opt_str("value"), Some("500000000000000000"));
        assert!(validate(def, &json!({})).is_err());
    }

    #[test]
    fn block_identifiers() {
        let def = find("get_block").unwrap();
        for (input, expected) in [
            (json!("LATEST"), json!("latest")),
            (json!(123), json!(123)),
            (json!("0x7b"), json!(123)),
            (json!("123"), json!(123)),
        ] {
            let args = validate(def, &json!({"block_identifier": input})).unwrap();
            assert_eq!(args.get("block_identifier"), Some(&expected));
        }
        assert!(validate(def, &json!({"block_identifier": "newest"})).is_err());
        let hash = format!("0x{}", "Ab".repeat(32));
        let args = validate(def, &json!({"block_identifier": hash})).unwrap();
        assert!(matches!(args.block_id("block_identifier").unwrap(), BlockId::Hash(_)));
    }

    #[test]
    fn count_bounds() {
        let def = find("get_latest_blocks").unwrap();
        assert!(validate(def, &json!({"count": 21})).is_err());
        assert!(validate(def, &json!({"count": 0})).is_err());
        assert_eq!(validate(def, &json!({"count": 3})).unwrap().opt_u64("count"), Some(3));
    }

    #[test]
    fn human_readable_abi() {
        let abi = abi_from_value(&json!(["function balanceOf(address) view returns (uint256)"])).unwrap();
        assert!(abi.function("balanceOf").is_ok());
    }

    #[test]
    fn schema_lists_required_args() {
        let def = find("get_token_balance").unwrap();
        let schema = tool_schema(def, &["ethereum".to_string()]);
        assert_eq!(schema["inputSchema"]["required"], json!(["address", "token_address"]));
        assert!(schema["inputSchema"]["properties"]["network"].is_object());
    }
}
