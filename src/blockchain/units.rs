//! Integer-exact conversion between wei, gwei and ether.
//!
//! All arithmetic goes through [`U256`]; decimal strings are parsed and
//! rendered by hand so no value ever passes through a float.

use crate::error::ToolError;
use ethers::types::U256;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Wei,
    Gwei,
    Ether,
}

impl Unit {
    pub const ALL: [Unit; 3] = [Unit::Wei, Unit::Gwei, Unit::Ether];

    pub fn decimals(&self) -> usize {
        match self {
            Unit::Wei => 0,
            Unit::Gwei => 9,
            Unit::Ether => 18,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Wei => "wei",
            Unit::Gwei => "gwei",
            Unit::Ether => "ether",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wei" => Ok(Unit::Wei),
            "gwei" => Ok(Unit::Gwei),
            "ether" | "eth" => Ok(Unit::Ether),
            other => Err(UnitError::InvalidUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("Invalid unit '{0}'. Supported units: wei, gwei, ether")]
    InvalidUnit(String),
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: String },
}

impl UnitError {
    fn amount(amount: &str, reason: impl Into<String>) -> Self {
        UnitError::InvalidAmount {
            amount: amount.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<UnitError> for ToolError {
    fn from(err: UnitError) -> Self {
        ToolError::validation(err.to_string())
    }
}

/// Parse a decimal amount expressed in `unit` into wei.
pub fn parse_amount(amount: &str, unit: Unit) -> Result<U256, UnitError> {
    let trimmed = amount.trim();
    if trimmed.starts_with('-') {
        return Err(UnitError::amount(amount, "amount must not be negative"));
    }
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(UnitError::amount(amount, "amount is empty"));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(UnitError::amount(amount, "amount must be a decimal number"));
    }
    let decimals = unit.decimals();
    let frac_digits = frac_part.trim_end_matches('0');
    if frac_digits.len() > decimals {
        return Err(UnitError::amount(
            amount,
            format!("too many decimal places for {} (max {})", unit, decimals),
        ));
    }

    let overflow = || UnitError::amount(amount, "amount exceeds 256 bits");
    let int_value = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part).map_err(|_| overflow())?
    };
    let frac_value = if frac_digits.is_empty() {
        U256::zero()
    } else {
        let padded = format!("{:0<width$}", frac_digits, width = decimals);
        U256::from_dec_str(&padded).map_err(|_| overflow())?
    };

    int_value
        .checked_mul(U256::exp10(decimals))
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(overflow)
}

/// Split `value` into integer and zero-padded fractional parts.
fn split_decimal(value: U256, decimals: usize) -> (String, String) {
    if decimals == 0 {
        return (value.to_string(), String::new());
    }
    let base = U256::exp10(decimals);
    let int_part = value / base;
    let frac_part = value % base;
    (
        int_part.to_string(),
        format!("{:0>width$}", frac_part.to_string(), width = decimals),
    )
}

/// Render wei in `unit` with the unit's full, fixed number of decimals.
pub fn format_amount(wei: U256, unit: Unit) -> String {
    let (int_part, frac_part) = split_decimal(wei, unit.decimals());
    if frac_part.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}

/// Like [`format_amount`] but without trailing fractional zeros.
pub fn format_amount_trimmed(wei: U256, unit: Unit) -> String {
    trim_decimal(format_amount(wei, unit))
}

fn trim_decimal(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Decimal ether amount to wei.
pub fn to_wei(ether: &str) -> Result<U256, UnitError> {
    parse_amount(ether, Unit::Ether)
}

pub fn to_gwei(wei: U256) -> String {
    format_amount(wei, Unit::Gwei)
}

pub fn to_ether(wei: U256) -> String {
    format_amount(wei, Unit::Ether)
}

/// Render a raw ERC-20 amount with the token's `decimals`.
pub fn format_units(raw: U256, decimals: u8) -> String {
    // 10^78 does not fit in 256 bits
    if decimals > 77 {
        return raw.to_string();
    }
    let (int_part, frac_part) = split_decimal(raw, decimals as usize);
    if frac_part.is_empty() {
        int_part
    } else {
        trim_decimal(format!("{}.{}", int_part, frac_part))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitAmount {
    pub amount: String,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllUnits {
    pub wei: String,
    pub gwei: String,
    pub ether: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub original: UnitAmount,
    pub converted: UnitAmount,
    pub all_units: AllUnits,
}

/// Convert `amount` from one unit to another. Converting the result back
/// yields the original amount exactly.
pub fn convert(amount: &str, from: Unit, to: Unit) -> Result<Conversion, UnitError> {
    let wei = parse_amount(amount, from)?;
    Ok(Conversion {
        original: UnitAmount {
            amount: amount.trim().to_string(),
            unit: from,
        },
        converted: UnitAmount {
            amount: format_amount_trimmed(wei, to),
            unit: to,
        },
        all_units: AllUnits {
            wei: wei.to_string(),
            gwei: format_amount_trimmed(wei, Unit::Gwei),
            ether: format_amount_trimmed(wei, Unit::Ether),
        },
    })
}

/// Standard amount shape: `{wei, gwei, ether, formatted}`.
pub fn amount_json(wei: U256, symbol: &str) -> Value {
    let ether = to_ether(wei);
    json!({
        "wei": wei.to_string(),
        "gwei": to_gwei(wei),
        "ether": ether,
        "formatted": format!("{} {}", ether, symbol),
    })
}

pub fn gas_price_json(wei: U256) -> Value {
    let gwei = to_gwei(wei);
    json!({
        "wei": wei.to_string(),
        "gwei": gwei,
        "formatted": format!("{} Gwei", format_amount_trimmed(wei, Unit::Gwei)),
    })
}
