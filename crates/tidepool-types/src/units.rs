//! Mojo / XCH unit conversion (1 XCH = 10^12 mojos).

use crate::constants::MOJOS_PER_XCH;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitsError {
    #[error("amount must be finite, got {0}")]
    NonFinite(f64),

    #[error("amount must be non-negative, got {0}")]
    Negative(f64),

    #[error("amount {0} XCH exceeds the representable mojo range")]
    TooLarge(f64),

    #[error("invalid mojo amount: {0}")]
    InvalidMojos(String),
}

/// Convert an XCH amount to a mojo string, rounding to the nearest mojo.
///
/// Rejects negative and non-finite input; never silently truncates.
pub fn xch_to_mojos(amount: f64) -> Result<String, UnitsError> {
    if !amount.is_finite() {
        return Err(UnitsError::NonFinite(amount));
    }
    if amount < 0.0 {
        return Err(UnitsError::Negative(amount));
    }
    let mojos = (amount * MOJOS_PER_XCH as f64).round();
    if mojos > u64::MAX as f64 {
        return Err(UnitsError::TooLarge(amount));
    }
    Ok(format!("{}", mojos as u64))
}

/// Convert a decimal mojo string to an XCH amount.
pub fn mojos_to_xch(mojos: &str) -> Result<f64, UnitsError> {
    let trimmed = mojos.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UnitsError::InvalidMojos(mojos.to_string()));
    }
    let value = trimmed
        .parse::<u128>()
        .map_err(|_| UnitsError::InvalidMojos(mojos.to_string()))?;
    Ok(value as f64 / MOJOS_PER_XCH as f64)
}

/// Convert a mojo amount to XCH.
pub fn mojos_to_xch_u64(mojos: u64) -> f64 {
    mojos as f64 / MOJOS_PER_XCH as f64
}

/// Format a mojo amount as a fixed-point XCH string (12 fractional digits,
/// trailing zeros trimmed).
pub fn format_xch(mojos: u128) -> String {
    let whole = mojos / MOJOS_PER_XCH as u128;
    let frac = mojos % MOJOS_PER_XCH as u128;
    if frac == 0 {
        return format!("{} XCH", whole);
    }
    let frac_str = format!("{:012}", frac);
    format!("{}.{} XCH", whole, frac_str.trim_end_matches('0'))
}
