//! Raw on-chain integers to display-unit decimals

use anyhow::{anyhow, Context, Result};
use num_bigint::BigUint;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Largest scale `Decimal` can hold
const MAX_DECIMAL_SCALE: u32 = 28;

/// `0x`-prefixed JSON-RPC quantity. An empty payload (`0x`) is rejected.
pub fn parse_hex_quantity(raw: &str) -> Result<BigUint> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() {
        return Err(anyhow!("empty hex quantity"));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16).with_context(|| format!("invalid hex quantity: {raw}"))
}

pub fn parse_integer(raw: &str) -> Result<BigUint> {
    BigUint::from_str(raw.trim()).with_context(|| format!("invalid integer amount: {raw}"))
}

/// `raw / 10^decimals`, exact whenever the result fits in a `Decimal`
pub fn scale_amount(raw: &BigUint, decimals: u32) -> Result<Decimal> {
    if decimals <= MAX_DECIMAL_SCALE {
        if let Ok(mantissa) = i128::try_from(raw) {
            if let Ok(value) = Decimal::try_from_i128_with_scale(mantissa, decimals) {
                return Ok(value.normalize());
            }
        }
    }

    // Wide mantissa or scale: truncate the fraction to what a Decimal can carry
    let digits = raw.to_string();
    let decimals = decimals as usize;
    let (int, frac) = if digits.len() > decimals {
        let (int, frac) = digits.split_at(digits.len() - decimals);
        (int.to_string(), frac.to_string())
    } else {
        ("0".to_string(), format!("{}{}", "0".repeat(decimals - digits.len()), digits))
    };

    let int_digits = int.trim_start_matches('0').len();
    if int_digits > MAX_DECIMAL_SCALE as usize {
        return Err(anyhow!("amount {raw} at {decimals} decimals does not fit"));
    }
    let keep = frac.len().min(MAX_DECIMAL_SCALE as usize - int_digits);

    let text = if keep == 0 {
        int
    } else {
        format!("{int}.{}", &frac[..keep])
    };
    Decimal::from_str(&text)
        .map(|d| d.normalize())
        .with_context(|| format!("amount {raw} at {decimals} decimals does not fit"))
}
