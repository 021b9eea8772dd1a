//! Conversion between human-readable decimal amounts and integer
//! smallest-unit representations.
//!
//! The integer direction is string-based decimal shifting: no binary
//! floating point touches an amount that ends up in a transaction or a
//! BIGINT column. Floats exist only in [`units_to_f64`] for display.

use crate::error::EngineError;

/// Parse a decimal amount string into integer smallest units.
///
/// The fractional part is right-padded or truncated to exactly `decimals`
/// digits and the digits are concatenated, so `"0.1"` at 9 decimals is
/// exactly `100_000_000`. Negative and non-numeric input is rejected; a
/// zero-valued string parses to `Ok(0)` and amount validation stays with
/// the caller.
pub fn to_base_units(amount: &str, decimals: u32) -> Result<u128, EngineError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount("empty amount".to_string()));
    }
    if trimmed.starts_with('-') {
        return Err(EngineError::InvalidAmount(format!(
            "negative amount: {trimmed}"
        )));
    }
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (trimmed, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(EngineError::InvalidAmount(format!(
            "not a decimal amount: {amount}"
        )));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(EngineError::InvalidAmount(format!(
            "not a decimal amount: {amount}"
        )));
    }

    let mut frac = frac_part.to_string();
    if frac.len() > decimals as usize {
        frac.truncate(decimals as usize);
    } else {
        while frac.len() < decimals as usize {
            frac.push('0');
        }
    }

    let digits = format!("{int_part}{frac}");
    if digits.is_empty() {
        return Ok(0);
    }
    digits
        .parse::<u128>()
        .map_err(|_| EngineError::InvalidAmount(format!("amount out of range: {trimmed}")))
}

/// Format integer smallest units as an exact decimal string.
///
/// Inverse of [`to_base_units`] up to trailing-zero normalization:
/// `to_base_units(&from_base_units(x, d), d) == x` for all `x` and `d`.
pub fn from_base_units(units: u128, decimals: u32) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let digits = units.to_string();
    let width = decimals as usize;
    let (int_part, frac_part) = if digits.len() > width {
        let split = digits.len() - width;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>width$}"))
    };
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    }
}

/// Lossy float rendering of a smallest-unit amount. Display only; never
/// feed the result back into trade math.
pub fn units_to_f64(units: u128, decimals: u32) -> f64 {
    units as f64 / 10f64.powi(decimals as i32)
}

/// Fixed-point scale for stored prices: lamports per smallest target unit,
/// times 10^9
pub const PRICE_SCALE: u128 = 1_000_000_000;

/// Integer average price of a buy, [`PRICE_SCALE`]-scaled. Zero when
/// nothing was received.
pub fn scaled_price(lamports: u64, token_units: u64) -> i64 {
    if token_units == 0 {
        return 0;
    }
    let scaled = (lamports as u128) * PRICE_SCALE / (token_units as u128);
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(to_base_units("0.1", 9).unwrap(), 100_000_000);
        assert_eq!(to_base_units("1", 9).unwrap(), 1_000_000_000);
        assert_eq!(to_base_units("50", 6).unwrap(), 50_000_000);
        assert_eq!(to_base_units("0.000001", 6).unwrap(), 1);
        assert_eq!(to_base_units("12.34", 2).unwrap(), 1234);
        assert_eq!(to_base_units("0", 9).unwrap(), 0);
    }

    #[test]
    fn pads_and_truncates_fractional_digits() {
        // shorter than `decimals`: right-padded
        assert_eq!(to_base_units("1.5", 6).unwrap(), 1_500_000);
        // longer than `decimals`: truncated, never rounded
        assert_eq!(to_base_units("1.23456789123", 9).unwrap(), 1_234_567_891);
        assert_eq!(to_base_units("0.9999", 2).unwrap(), 99);
    }

    #[test]
    fn accepts_bare_point_forms() {
        assert_eq!(to_base_units(".5", 2).unwrap(), 50);
        assert_eq!(to_base_units("5.", 2).unwrap(), 500);
    }

    #[test]
    fn rejects_garbage() {
        assert!(to_base_units("", 9).is_err());
        assert!(to_base_units(".", 9).is_err());
        assert!(to_base_units("-1", 9).is_err());
        assert!(to_base_units("1.2.3", 9).is_err());
        assert!(to_base_units("1e9", 9).is_err());
        assert!(to_base_units("abc", 9).is_err());
    }

    #[test]
    fn formats_exact_decimal_strings() {
        assert_eq!(from_base_units(100_000_000, 9), "0.1");
        assert_eq!(from_base_units(50_000_000, 6), "50");
        assert_eq!(from_base_units(1, 6), "0.000001");
        assert_eq!(from_base_units(0, 9), "0");
        assert_eq!(from_base_units(1_234_567_891, 9), "1.234567891");
        assert_eq!(from_base_units(42, 0), "42");
    }

    #[test]
    fn price_scaling() {
        // 0.1 SOL for 50 tokens at 6 decimals: 2 lamports per unit, times 1e9
        assert_eq!(scaled_price(100_000_000, 50_000_000), 2_000_000_000);
        // cheaper than 1 lamport per unit stays representable
        assert_eq!(scaled_price(1_000, 2_000_000), 500);
        assert_eq!(scaled_price(1, 1_000_000_000_000), 0);
        assert_eq!(scaled_price(100, 0), 0);
        assert_eq!(scaled_price(u64::MAX, 1), i64::MAX);
    }

    #[test]
    fn round_trip_is_exact() {
        let cases: &[(u128, u32)] = &[
            (0, 0),
            (0, 9),
            (1, 9),
            (999_999_999, 9),
            (1_000_000_000, 9),
            (100_000_000, 9),
            (50_000_000, 6),
            (u64::MAX as u128, 9),
            (123_456_789_012_345, 12),
        ];
        for &(units, decimals) in cases {
            let decimal = from_base_units(units, decimals);
            assert_eq!(
                to_base_units(&decimal, decimals).unwrap(),
                units,
                "round trip failed for {units} at {decimals} decimals"
            );
        }
    }
}
