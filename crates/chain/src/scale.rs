//! Exact decimal scaling of raw on-chain answers into display strings.
//!
//! A raw answer is scaled as `raw * 10^decimal_places / multiply`, then
//! shifted down by `format_decimal_places` digits for display. All
//! arithmetic is integer-exact; answers routinely exceed what an `f64`
//! mantissa can hold, and the formatted string is an observable output.

use alloy::primitives::{I256, U256};

use crate::error::ChainError;

/// Display scaling parameters for one feed.
#[derive(Debug, Clone)]
pub struct Scale {
    /// Divisor applied to the raw answer (a decimal integer in config).
    multiply: U256,
    /// Power of ten applied to the raw answer before dividing.
    decimal_places: u32,
    /// Digits shifted below the decimal point for display.
    format_decimal_places: u32,
}

impl Scale {
    /// Build a scale from feed-config fields. Rejects a zero or unparsable
    /// `multiply` before any answer flows through it.
    pub fn new(
        multiply: &str,
        decimal_places: u32,
        format_decimal_places: u32,
    ) -> Result<Self, ChainError> {
        let multiply = U256::from_str_radix(multiply, 10)
            .map_err(|_| ChainError::Scale(format!("invalid multiply '{multiply}'")))?;

        if multiply.is_zero() {
            return Err(ChainError::Scale("multiply must be non-zero".to_string()));
        }

        Ok(Self {
            multiply,
            decimal_places,
            format_decimal_places,
        })
    }

    /// The no-op scale: multiply 1, no decimal shift.
    pub fn identity() -> Self {
        Self {
            multiply: U256::from(1u8),
            decimal_places: 0,
            format_decimal_places: 0,
        }
    }

    /// Format a raw answer as a display string with at least one fractional
    /// digit, e.g. `"38000000000.0"` or `"38.5"`.
    pub fn format(&self, raw: I256) -> String {
        let negative = raw.is_negative();
        let magnitude = raw.unsigned_abs();

        let scaled = magnitude
            .checked_mul(pow10(self.decimal_places))
            .unwrap_or(U256::MAX)
            / self.multiply;

        let divisor = pow10(self.format_decimal_places);
        let integer = scaled / divisor;
        let remainder = scaled % divisor;

        let mut digits = remainder.to_string();
        while digits.len() < self.format_decimal_places as usize {
            digits.insert(0, '0');
        }
        let fraction = digits.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };

        let sign = if negative && !scaled.is_zero() { "-" } else { "" };
        format!("{sign}{integer}.{fraction}")
    }
}

/// One-call formatting for callers that do not hold a [`Scale`].
pub fn format_answer(
    raw: I256,
    multiply: &str,
    decimal_places: u32,
    format_decimal_places: u32,
) -> Result<String, ChainError> {
    Ok(Scale::new(multiply, decimal_places, format_decimal_places)?.format(raw))
}

fn pow10(exp: u32) -> U256 {
    U256::from(10u8).pow(U256::from(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: i128) -> I256 {
        I256::try_from(value).unwrap()
    }

    #[test]
    fn test_format_no_shift() {
        // 0x08d8f9fc00 == 38_000_000_000
        let answer = raw(0x08d8f9fc00);
        assert_eq!(format_answer(answer, "1", 0, 0).unwrap(), "38000000000.0");
    }

    #[test]
    fn test_format_shifted_for_display() {
        let answer = raw(0x08d8f9fc00);
        assert_eq!(format_answer(answer, "1", 9, 9).unwrap().as_str(), "38000000000.0");
        assert_eq!(format_answer(answer, "1", 0, 9).unwrap(), "38.0");
    }

    #[test]
    fn test_format_trims_fraction_to_significant_digits() {
        // $38.50 quoted with 8 on-chain decimals.
        assert_eq!(
            format_answer(raw(3_850_000_000), "1", 0, 8).unwrap(),
            "38.5"
        );
        assert_eq!(
            format_answer(raw(3_850_000_001), "1", 0, 8).unwrap(),
            "38.50000001"
        );
    }

    #[test]
    fn test_format_with_multiply_divisor() {
        // multiply == 10^8 cancels an 8-decimal raw quote.
        assert_eq!(
            format_answer(raw(3_850_000_000), "100000000", 8, 8).unwrap(),
            "38.5"
        );
    }

    #[test]
    fn test_format_negative_and_zero() {
        assert_eq!(format_answer(raw(-42), "1", 0, 0).unwrap(), "-42.0");
        assert_eq!(format_answer(raw(0), "1", 0, 0).unwrap(), "0.0");
    }

    #[test]
    fn test_rejects_bad_multiply() {
        assert!(matches!(
            Scale::new("0", 0, 0),
            Err(ChainError::Scale(_))
        ));
        assert!(matches!(
            Scale::new("not-a-number", 0, 0),
            Err(ChainError::Scale(_))
        ));
    }
}
