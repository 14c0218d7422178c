// src/blockchain/registry.rs

use crate::error::ToolError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Optional features a network may or may not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Ens,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Ens => "ENS",
        }
    }
}

/// Static description of one EVM network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    /// Registry key, lowercase (e.g. `ethereum`).
    pub name: String,
    pub display_name: String,
    pub chain_id: u64,
    /// Never serialized: endpoints regularly carry API keys.
    #[serde(skip_serializing)]
    pub endpoint_url: String,
    pub explorer_url: String,
    pub native_token_symbol: String,
    pub supports_ens: bool,
    pub is_testnet: bool,
}

impl NetworkConfig {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Ens => self.supports_ens,
        }
    }
}

// (name, display name, chain id, default rpc, explorer, native token, ens, testnet)
type BuiltinNetwork = (&'static str, &'static str, u64, &'static str, &'static str, &'static str, bool, bool);

const BUILTIN_NETWORKS: &[BuiltinNetwork] = &[
    ("ethereum", "Ethereum Mainnet", 1, "https://eth.llamarpc.com", "https://etherscan.io", "ETH", true, false),
    ("polygon", "Polygon", 137, "https://polygon.llamarpc.com", "https://polygonscan.com", "MATIC", false, false),
    ("bsc", "Binance Smart Chain", 56, "https://bsc-dataseed.binance.org/", "https://bscscan.com", "BNB", false, false),
    ("arbitrum", "Arbitrum One", 42161, "https://arb1.arbitrum.io/rpc", "https://arbiscan.io", "ETH", true, false),
    ("optimism", "Optimism", 10, "https://mainnet.optimism.io", "https://optimistic.etherscan.io", "ETH", true, false),
    ("base", "Base", 8453, "https://mainnet.base.org", "https://basescan.org", "ETH", true, false),
    ("avalanche", "Avalanche C-Chain", 43114, "https://api.avax.network/ext/bc/C/rpc", "https://snowtrace.io", "AVAX", false, false),
    ("fantom", "Fantom Opera", 250, "https://rpc.ftm.tools", "https://ftmscan.com", "FTM", false, false),
    ("sepolia", "Ethereum Sepolia", 11155111, "https://rpc.sepolia.org", "https://sepolia.etherscan.io", "ETH", true, true),
    ("goerli", "Ethereum Goerli", 5, "https://rpc.ankr.com/eth_goerli", "https://goerli.etherscan.io", "ETH", true, true),
];

/// The built-in network table with endpoint overrides applied.
///
/// `overrides` maps a network name to the endpoint that should replace the
/// default public RPC URL.
pub fn builtin_networks(overrides: &HashMap<String, String>) -> Vec<NetworkConfig> {
    BUILTIN_NETWORKS
        .iter()
        .map(|(name, display, chain_id, rpc, explorer, token, ens, testnet)| NetworkConfig {
            name: name.to_string(),
            display_name: display.to_string(),
            chain_id: *chain_id,
            endpoint_url: overrides
                .get(*name)
                .cloned()
                .unwrap_or_else(|| rpc.to_string()),
            explorer_url: explorer.to_string(),
            native_token_symbol: token.to_string(),
            supports_ens: *ens,
            is_testnet: *testnet,
        })
        .collect()
}

/// Normalize the spellings users pass for a network.
pub fn normalize_network_name(input: &str) -> String {
    let mut s = input.trim().to_lowercase();
    s = s.replace([' ', '_'], "-");
    match s.as_str() {
        "eth" | "mainnet" | "main" | "ethereum-mainnet" => "ethereum".to_string(),
        "matic" | "polygon-pos" => "polygon".to_string(),
        "bnb" | "binance" | "bnb-chain" | "binance-smart-chain" => "bsc".to_string(),
        "arb" | "arbitrum-one" => "arbitrum".to_string(),
        "op" | "optimism-mainnet" => "optimism".to_string(),
        "avax" | "avalanche-c-chain" => "avalanche".to_string(),
        "ftm" | "fantom-opera" => "fantom".to_string(),
        _ => s,
    }
}

/// Immutable, shareable table of supported networks.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    networks: Arc<Vec<NetworkConfig>>,
    default_network: String,
}

impl NetworkRegistry {
    /// Build a registry. The default network must be one of `networks`.
    pub fn new(networks: Vec<NetworkConfig>, default_network: &str) -> Result<Self, ToolError> {
        let default_network = normalize_network_name(default_network);
        if !networks.iter().any(|n| n.name == default_network) {
            return Err(ToolError::network_unsupported(&default_network));
        }
        Ok(Self {
            networks: Arc::new(networks),
            default_network,
        })
    }

    pub fn default_network(&self) -> &str {
        &self.default_network
    }

    /// All networks in declaration order.
    pub fn all(&self) -> &[NetworkConfig] {
        &self.networks
    }

    pub fn names(&self) -> Vec<String> {
        self.networks.iter().map(|n| n.name.clone()).collect()
    }

    /// Look up a network by name, alias or decimal chain id.
    pub fn resolve(&self, name: &str) -> Result<&NetworkConfig, ToolError> {
        let normalized = normalize_network_name(name);
        if let Some(network) = self.networks.iter().find(|n| n.name == normalized) {
            return Ok(network);
        }
        if let Ok(chain_id) = normalized.parse::<u64>() {
            if let Some(network) = self.networks.iter().find(|n| n.chain_id == chain_id) {
                return Ok(network);
            }
        }
        Err(ToolError::new(
            crate::error::ErrorKind::NetworkUnsupported,
            format!(
                "Unsupported network: '{}'. Available: {}",
                name,
                self.names().join(", ")
            ),
        ))
    }

    /// Resolve the requested network, falling back to the default only when
    /// the caller did not name one.
    pub fn resolve_or_default(&self, name: Option<&str>) -> Result<&NetworkConfig, ToolError> {
        self.resolve(name.unwrap_or(&self.default_network))
    }

    pub fn require_capability(
        &self,
        network: &NetworkConfig,
        capability: Capability,
    ) -> Result<(), ToolError> {
        if network.supports(capability) {
            Ok(())
        } else {
            Err(ToolError::capability_unsupported(format!(
                "{} is not supported on network: {}",
                capability.as_str(),
                network.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn registry() -> NetworkRegistry {
        NetworkRegistry::new(builtin_networks(&HashMap::new()), "ethereum").unwrap()
    }

    #[test]
    fn resolves_aliases_and_chain_ids() {
        let reg = registry();
        assert_eq!(reg.resolve("ETH").unwrap().name, "ethereum");
        assert_eq!(reg.resolve("matic").unwrap().name, "polygon");
        assert_eq!(reg.resolve("42161").unwrap().name, "arbitrum");
        assert_eq!(reg.resolve_or_default(None).unwrap().name, "ethereum");
    }

    #[test]
    fn unknown_network_is_reported() {
        let err = registry().resolve("solana").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkUnsupported);
    }

    #[test]
    fn ens_capability_follows_table() {
        let reg = registry();
        let polygon = reg.resolve("polygon").unwrap().clone();
        let err = reg.require_capability(&polygon, Capability::Ens).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapabilityUnsupported);
        let eth = reg.resolve("ethereum").unwrap().clone();
        assert!(reg.require_capability(&eth, Capability::Ens).is_ok());
    }

    #[test]
    fn overrides_replace_endpoints() {
        let mut overrides = HashMap::new();
        overrides.insert("base".to_string(), "http://localhost:8545".to_string());
        let nets = builtin_networks(&overrides);
        let base = nets.iter().find(|n| n.name == "base").unwrap();
        assert_eq!(base.endpoint_url, "http://localhost:8545");
    }
}
