//! Exact conversion between decimal strings and integer base units.

use crate::error::{Error, Result};

/// Parse a decimal string into base units at `precision` decimal places.
///
/// The result is `round(value * 10^precision)`, rounding half-up on the first
/// dropped digit. Signs, exponents, empty strings and values that do not fit
/// in a `u64` are rejected. Zero is accepted here; callers that need a
/// positive amount check for it themselves.
pub fn parse_decimal(value: &str, precision: u8) -> Result<u64> {
    let value = value.trim();
    let invalid = || Error::InvalidAmount(format!("'{value}' is not a decimal number"));

    let (int_part, frac_part) = match value.split_once('.') {
        Some((i, f)) => (i, f),
        None => (value, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let overflow = || Error::InvalidAmount(format!("'{value}' overflows a 64-bit amount"));
    let scale = 10u64
        .checked_pow(u32::from(precision))
        .ok_or_else(overflow)?;

    let mut units: u64 = 0;
    for b in int_part.bytes() {
        units = units
            .checked_mul(10)
            .and_then(|u| u.checked_add(u64::from(b - b'0')))
            .ok_or_else(overflow)?;
    }
    units = units.checked_mul(scale).ok_or_else(overflow)?;

    let precision = usize::from(precision);
    let mut frac_units: u64 = 0;
    for i in 0..precision {
        let digit = frac_part.as_bytes().get(i).map_or(0, |b| b - b'0');
        frac_units = frac_units * 10 + u64::from(digit);
    }
    if let Some(next) = frac_part.as_bytes().get(precision) {
        if *next >= b'5' {
            frac_units += 1;
        }
    }

    units.checked_add(frac_units).ok_or_else(overflow)
}

/// Render base units as a decimal string with exactly `precision` fractional digits.
pub fn format_decimal(amount: u64, precision: u8) -> String {
    if precision == 0 {
        return amount.to_string();
    }
    let digits = amount.to_string();
    let precision = usize::from(precision);
    if digits.len() > precision {
        let (int_part, frac_part) = digits.split_at(digits.len() - precision);
        format!("{int_part}.{frac_part}")
    } else {
        format!("0.{digits:0>precision$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_values() {
        assert_eq!(parse_decimal("1", 8).unwrap(), 100_000_000);
        assert_eq!(parse_decimal("0.00000200", 8).unwrap(), 200);
        assert_eq!(parse_decimal("1.5", 2).unwrap(), 150);
        assert_eq!(parse_decimal(".25", 2).unwrap(), 25);
        assert_eq!(parse_decimal("3.", 2).unwrap(), 300);
        assert_eq!(parse_decimal(" 42 ", 0).unwrap(), 42);
    }

    #[test]
    fn rounds_half_up_on_first_dropped_digit() {
        assert_eq!(parse_decimal("0.125", 2).unwrap(), 13);
        assert_eq!(parse_decimal("0.124999", 2).unwrap(), 12);
        assert_eq!(parse_decimal("0.999", 2).unwrap(), 100);
        assert_eq!(parse_decimal("0.000000015", 8).unwrap(), 2);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", ".", "-1", "+1", "1e8", "1.2.3", "abc", "1,5"] {
            assert!(
                matches!(parse_decimal(bad, 8), Err(Error::InvalidAmount(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_decimal("184467440737.09551616", 8).is_err());
        assert!(parse_decimal("18446744073709551616", 0).is_err());
        assert_eq!(
            parse_decimal("18446744073709551615", 0).unwrap(),
            u64::MAX
        );
    }

    #[test]
    fn zero_is_parsed() {
        assert_eq!(parse_decimal("0.000", 8).unwrap(), 0);
    }

    #[test]
    fn formats_with_fixed_precision() {
        assert_eq!(format_decimal(100_000_000, 8), "1.00000000");
        assert_eq!(format_decimal(200, 8), "0.00000200");
        assert_eq!(format_decimal(150, 2), "1.50");
        assert_eq!(format_decimal(7, 0), "7");
        assert_eq!(format_decimal(0, 2), "0.00");
    }

    #[test]
    fn format_then_parse_is_identity() {
        for amount in [0u64, 1, 99, 100, 123_456_789, 2_100_000_000_000_000] {
            assert_eq!(parse_decimal(&format_decimal(amount, 8), 8).unwrap(), amount);
        }
    }
}
