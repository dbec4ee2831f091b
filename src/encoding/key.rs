//! # Big-Endian Key Encoding for Ordered Indexes
//!
//! Encoded keys compare with a plain byte comparison, so the ordered index
//! can keep them in a `BTreeSet<Vec<u8>>`-like structure without any
//! type-specific comparator.
//!
//! ## Type Prefix Scheme
//!
//! ```text
//! 0x01       NULL
//! 0x02-0x03  Booleans (FALSE < TRUE)
//! 0x10-0x19  Numbers (NEG_INFINITY < negatives < ZERO < positives < POS_INFINITY < NAN)
//! 0x20       Text
//! 0x32       Timestamp
//! 0x50       JSON (canonical text)
//! 0xFF       MAX_KEY (sentinel for range upper bounds)
//! ```
//!
//! ## Number Encoding Strategy
//!
//! - Negative integers: NEG_INT prefix + two's complement big-endian
//! - Zero: ZERO prefix only (shared by `0` and `0.0`)
//! - Positive integers: POS_INT prefix + big-endian bytes
//! - Negative floats: NEG_FLOAT prefix + inverted IEEE 754 bits
//! - Positive floats: POS_FLOAT prefix + IEEE 754 bits
//!
//! A column's values are coerced to its declared type before encoding, so a
//! single index never mixes the integer and float families.
//!
//! ## Text Encoding Strategy
//!
//! ```text
//! 0x00 -> 0x00 0xFF  (escape null byte)
//! 0xFF -> 0xFF 0x00  (escape 0xFF byte)
//! Terminator: 0x00 0x00
//! ```
//!
//! The terminator keeps composite keys ordered column by column: `("a", 2)`
//! sorts before `("ab", 1)`.

use crate::types::Value;

pub mod type_prefix {
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;

    pub const NEG_INFINITY: u8 = 0x10;
    pub const NEG_INT: u8 = 0x12;
    pub const NEG_FLOAT: u8 = 0x13;
    pub const ZERO: u8 = 0x14;
    pub const POS_FLOAT: u8 = 0x15;
    pub const POS_INT: u8 = 0x16;
    pub const POS_INFINITY: u8 = 0x18;
    pub const NAN: u8 = 0x19;

    pub const TEXT: u8 = 0x20;
    pub const TIMESTAMP: u8 = 0x32;
    pub const JSON: u8 = 0x50;
    pub const VECTOR: u8 = 0x70;

    pub const MAX_KEY: u8 = 0xFF;
}

/// Encodes a composite key.
pub fn encode_key(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 9);
    for value in values {
        encode_value_to(value, &mut buf);
    }
    buf
}

pub fn encode_value_to(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.push(type_prefix::NULL),
        Value::Boolean(false) => buf.push(type_prefix::FALSE),
        Value::Boolean(true) => buf.push(type_prefix::TRUE),
        Value::Integer(i) => encode_int_to(*i, buf),
        Value::Float(f) => encode_float_to(*f, buf),
        Value::Text(s) => {
            buf.push(type_prefix::TEXT);
            encode_escaped_bytes(s.as_bytes(), buf);
        }
        Value::Timestamp(ts) => {
            buf.push(type_prefix::TIMESTAMP);
            let micros = ts.timestamp_micros();
            buf.extend_from_slice(&((micros as u64) ^ (1 << 63)).to_be_bytes());
        }
        Value::Json(s) => {
            buf.push(type_prefix::JSON);
            encode_escaped_bytes(s.as_bytes(), buf);
        }
        Value::Vector(v) => {
            buf.push(type_prefix::VECTOR);
            for component in v {
                let bits = component.to_bits();
                let ordered = if bits & (1 << 31) != 0 { !bits } else { bits ^ (1 << 31) };
                buf.extend_from_slice(&ordered.to_be_bytes());
            }
        }
    }
}

pub fn encode_int_to(n: i64, buf: &mut Vec<u8>) {
    match n.cmp(&0) {
        std::cmp::Ordering::Less => {
            buf.push(type_prefix::NEG_INT);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        std::cmp::Ordering::Equal => buf.push(type_prefix::ZERO),
        std::cmp::Ordering::Greater => {
            buf.push(type_prefix::POS_INT);
            buf.extend_from_slice(&n.to_be_bytes());
        }
    }
}

pub fn encode_float_to(f: f64, buf: &mut Vec<u8>) {
    if f.is_nan() {
        buf.push(type_prefix::NAN);
    } else if f == f64::INFINITY {
        buf.push(type_prefix::POS_INFINITY);
    } else if f == f64::NEG_INFINITY {
        buf.push(type_prefix::NEG_INFINITY);
    } else if f == 0.0 {
        buf.push(type_prefix::ZERO);
    } else if f < 0.0 {
        buf.push(type_prefix::NEG_FLOAT);
        buf.extend_from_slice(&(!f.to_bits()).to_be_bytes());
    } else {
        buf.push(type_prefix::POS_FLOAT);
        buf.extend_from_slice(&f.to_bits().to_be_bytes());
    }
}

fn encode_escaped_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        match b {
            0x00 => buf.extend_from_slice(&[0x00, 0xFF]),
            0xFF => buf.extend_from_slice(&[0xFF, 0x00]),
            _ => buf.push(b),
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}

/// Smallest key strictly greater than every key that starts with `prefix`.
pub fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = Vec::with_capacity(prefix.len() + 1);
    upper.extend_from_slice(prefix);
    upper.push(type_prefix::MAX_KEY);
    upper
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: Value) -> Vec<u8> {
        encode_key(&[v])
    }

    #[test]
    fn encode_null_produces_single_byte_0x01() {
        assert_eq!(key(Value::Null), vec![type_prefix::NULL]);
    }

    #[test]
    fn integers_sort_across_sign() {
        let ordered = [-100i64, -1, 0, 1, 100, i64::MAX];
        let keys: Vec<_> = ordered.iter().map(|&n| key(Value::Integer(n))).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn floats_sort_across_sign() {
        let ordered = [f64::NEG_INFINITY, -2.5, -0.1, 0.0, 0.1, 9.99, f64::INFINITY];
        let keys: Vec<_> = ordered.iter().map(|&f| key(Value::Float(f))).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn composite_text_keys_order_by_first_column() {
        let a = encode_key(&[Value::from("a"), Value::Integer(2)]);
        let ab = encode_key(&[Value::from("ab"), Value::Integer(1)]);
        assert!(a < ab);
    }

    #[test]
    fn embedded_nul_is_escaped() {
        let k1 = key(Value::from("a\0b"));
        let k2 = key(Value::from("a"));
        assert!(k2 < k1);
    }

    #[test]
    fn prefix_upper_bound_covers_longer_keys() {
        let prefix = encode_key(&[Value::Integer(7)]);
        let longer = encode_key(&[Value::Integer(7), Value::from("zzz")]);
        assert!(longer < prefix_upper_bound(&prefix));
        assert!(prefix_upper_bound(&prefix) < encode_key(&[Value::Integer(8)]));
    }
}
