//! Decode the Postgres binary NUMERIC wire format into `f64`.
//!
//! Numeric source columns are widened to double on extraction; the loss of
//! precision is the engine's documented trade-off.

use postgres_types::{FromSql, Type};
use std::error::Error;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// A NUMERIC value widened to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PgNumeric(pub(crate) f64);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        // Header: ndigits, weight, sign, dscale, then base-10000 digits.
        if raw.len() < 8 {
            return Err("numeric value shorter than its header".into());
        }
        let ndigits = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric value shorter than its digit count".into());
        }

        if sign == NUMERIC_NAN {
            return Ok(PgNumeric(f64::NAN));
        }

        let mut value = 0f64;
        for i in 0..ndigits {
            let digit = u16::from_be_bytes([raw[8 + i * 2], raw[9 + i * 2]]) as f64;
            value += digit * 10_000f64.powi(weight - i as i32);
        }
        match sign {
            NUMERIC_POS => Ok(PgNumeric(value)),
            NUMERIC_NEG => Ok(PgNumeric(-value)),
            other => Err(format!("unknown numeric sign word {other:#x}").into()),
        }
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(ndigits: &[u16], weight: i16, sign: u16, dscale: u16) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend((ndigits.len() as u16).to_be_bytes());
        raw.extend(weight.to_be_bytes());
        raw.extend(sign.to_be_bytes());
        raw.extend(dscale.to_be_bytes());
        for digit in ndigits {
            raw.extend(digit.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_integral() {
        // 12345678 = 1234 * 10000^1 + 5678 * 10000^0
        let raw = encode(&[1234, 5678], 1, NUMERIC_POS, 0);
        let value = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(value.0, 12_345_678.0);
    }

    #[test]
    fn test_decode_fractional_and_negative() {
        // -11.5 = -(11 * 10000^0 + 5000 * 10000^-1)
        let raw = encode(&[11, 5000], 0, NUMERIC_NEG, 1);
        let value = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(value.0, -11.5);
    }

    #[test]
    fn test_decode_zero_and_nan() {
        let raw = encode(&[], 0, NUMERIC_POS, 0);
        assert_eq!(PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap().0, 0.0);

        let raw = encode(&[], 0, NUMERIC_NAN, 0);
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap().0.is_nan());
    }

    #[test]
    fn test_truncated_input_rejected() {
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &[0, 2, 0, 0]).is_err());
        let raw = encode(&[1234, 5678], 1, NUMERIC_POS, 0);
        assert!(PgNumeric::from_sql(&Type::NUMERIC, &raw[..raw.len() - 2]).is_err());
    }
}
