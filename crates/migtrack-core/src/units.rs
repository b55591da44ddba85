//! Exact conversion between raw token units and display decimals.

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("'{0}' is not a decimal number")]
    NotDecimal(String),

    #[error("'{value}' has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u8 },

    #[error("'{0}' does not fit in 256 bits")]
    Overflow(String),
}

/// `10^decimals`, or `None` if it does not fit in 256 bits.
pub fn scale(decimals: u8) -> Option<U256> {
    U256::from(10u64).checked_pow(U256::from(decimals))
}

/// Render `raw / 10^decimals` as a decimal string without trailing zeros.
///
/// `format_units(1_500_000_000_000_000_000, 18) == "1.5"`.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let Some(scale) = scale(decimals) else {
        return "0".into();
    };
    let whole = raw / scale;
    let frac = raw % scale;
    if frac.is_zero() {
        return whole.to_string();
    }
    let mut digits = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    while digits.ends_with('0') {
        digits.pop();
    }
    format!("{whole}.{digits}")
}

/// Parse a display amount (`"1.5"`) into raw units (`1.5 * 10^decimals`).
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, UnitsError> {
    let value = value.trim();
    let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(UnitsError::NotDecimal(value.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(UnitsError::TooPrecise {
            value: value.to_string(),
            decimals,
        });
    }

    let overflow = || UnitsError::Overflow(value.to_string());
    let scale = scale(decimals).ok_or_else(overflow)?;
    let parse = |s: &str| -> Result<U256, UnitsError> {
        if s.is_empty() {
            Ok(U256::ZERO)
        } else {
            U256::from_str_radix(s, 10).map_err(|_| overflow())
        }
    };

    let frac_padded = format!("{frac:0<width$}", width = decimals as usize);
    let whole_raw = parse(whole)?.checked_mul(scale).ok_or_else(overflow)?;
    whole_raw
        .checked_add(parse(&frac_padded)?)
        .ok_or_else(overflow)
}
