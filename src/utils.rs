//! Small parsing helpers shared by argument validation and the services.

use std::str::FromStr;

use ethers::types::{Address, H256};
use ethers::utils::to_checksum;

use crate::error::ToolError;

/// Strip an optional `0x`/`0X` prefix.
pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse a 20-byte address. All-lowercase and all-uppercase forms are
/// accepted as-is; mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address, ToolError> {
    let raw = input.trim();
    let body = strip_hex_prefix(raw);
    if body.len() != 40 || !is_hex(body) {
        return Err(ToolError::validation(format!(
            "Invalid address '{}': expected 40 hex characters",
            raw
        )));
    }
    let address = Address::from_str(body)
        .map_err(|e| ToolError::validation(format!("Invalid address '{}': {}", raw, e)))?;

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && checksum(&address)[2..] != *body {
        return Err(ToolError::validation(format!(
            "Invalid address '{}': bad EIP-55 checksum",
            raw
        )));
    }
    Ok(address)
}

/// EIP-55 checksummed form.
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Lowercase `0x`-prefixed form used in cache keys.
pub fn lower_hex_address(address: &Address) -> String {
    format!("{:#x}", address)
}

pub fn parse_tx_hash(input: &str) -> Result<H256, ToolError> {
    let raw = input.trim();
    let body = strip_hex_prefix(raw);
    if body.len() != 64 || !is_hex(body) {
        return Err(ToolError::validation(format!(
            "Invalid transaction hash '{}': expected 64 hex characters",
            raw
        )));
    }
    H256::from_str(body)
        .map_err(|e| ToolError::validation(format!("Invalid transaction hash '{}': {}", raw, e)))
}

/// Decode `0x`-prefixed (or bare) hex into bytes.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, ToolError> {
    let body = strip_hex_prefix(input.trim());
    if body.len() % 2 != 0 {
        return Err(ToolError::validation(format!(
            "Invalid hex data '{}': odd number of digits",
            input
        )));
    }
    hex::decode(body).map_err(|e| ToolError::validation(format!("Invalid hex data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VITALIK: &str = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045";

    #[test]
    fn accepts_checksummed_and_lowercase() {
        let a = parse_address(VITALIK).unwrap();
        let b = parse_address(&VITALIK.to_lowercase()).unwrap();
        assert_eq!(a, b);
        assert_eq!(checksum(&a), VITALIK);
        // no prefix is fine too
        assert_eq!(parse_address(&VITALIK[2..]).unwrap(), a);
    }

    #[test]
    fn rejects_bad_checksum_and_length() {
        let broken = VITALIK.replace("dA", "Da");
        assert!(parse_address(&broken).is_err());
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz8dA6BF26964aF9D7eEd9e03E53415D37aA9604").is_err());
    }

    #[test]
    fn hex_data() {
        assert_eq!(hex_to_bytes("0xa9059cbb").unwrap(), vec![0xa9, 0x05, 0x9c, 0xbb]);
        assert!(hex_to_bytes("0xabc").is_err());
    }
}
