//! Unsigned integers of arbitrary width, rendered as JSON numbers.

use serde_json::{Number, Value};

/// Decimal digits of `bytes` read as an unsigned big-endian integer.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unsigned_decimal(bytes: &[u8]) -> String {
    let mut remaining: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if remaining.is_empty() {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while !remaining.is_empty() {
        let mut rem = 0u32;
        let mut quotient = Vec::with_capacity(remaining.len());
        for &byte in &remaining {
            let acc = rem * 256 + u32::from(byte);
            let q = acc / 10;
            rem = acc % 10;
            if !quotient.is_empty() || q != 0 {
                quotient.push(q as u8);
            }
        }
        digits.push(b'0' + rem as u8);
        remaining = quotient;
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

/// `bytes` as an unsigned JSON number, without loss of precision.
#[must_use]
pub fn unsigned_number(bytes: &[u8]) -> Value {
    let digits = unsigned_decimal(bytes);
    match digits.parse::<Number>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(digits),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_and_small_values() {
        assert_eq!(unsigned_decimal(&[]), "0");
        assert_eq!(unsigned_decimal(&[0, 0]), "0");
        assert_eq!(unsigned_decimal(&[1, 0]), "256");
        assert_eq!(unsigned_decimal(&[0xff]), "255");
    }

    #[test]
    fn all_ones_hash() {
        assert_eq!(
            unsigned_decimal(&[0xff; 32]),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn wide_numbers_keep_every_digit() {
        let value = unsigned_number(&[0xff; 32]);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    proptest! {
        #[test]
        fn matches_u128_rendering(x in any::<u128>()) {
            prop_assert_eq!(unsigned_decimal(&x.to_be_bytes()), x.to_string());
        }
    }
}
