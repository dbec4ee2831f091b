//! # Runtime Value Representation
//!
//! `Value` is the single owned representation used everywhere a SQL value
//! flows: parameters, stored row versions, expression results and query
//! output.
//!
//! ## Value Variants
//!
//! | Variant | Rust Type | Description |
//! |---------|-----------|-------------|
//! | Null | - | SQL NULL |
//! | Boolean | bool | never conflated with 0/1 |
//! | Integer | i64 | 64-bit signed integer |
//! | Float | f64 | 64-bit floating point |
//! | Text | String | UTF-8 string |
//! | Timestamp | DateTime<Utc> | instant, normalized to UTC on the way in |
//! | Json | String | canonical JSON text (sorted keys, compact) |
//! | Vector | Vec<f32> | fixed-dimension float vector |
//!
//! ## Comparison
//!
//! Two orderings exist:
//!
//! - `compare`: SQL comparison. Returns `Ok(None)` when either side is NULL
//!   (UNKNOWN), compares integers and floats numerically and coerces text to
//!   the other side's kind where that is meaningful.
//! - `sort_cmp`: total order for ORDER BY, MIN/MAX and DISTINCT. NULL sorts
//!   lowest, then booleans, numbers, text, timestamps, JSON, vectors.
//!
//! `PartialEq`/`Hash` treat NULL as equal to NULL and `1` as equal to `1.0`,
//! which is what GROUP BY and DISTINCT need.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::DataType;
use crate::error::DbError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(String),
    Vector(Vec<f32>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Json(_) => "JSON",
            Value::Vector(_) => "VECTOR",
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Text(_) => Some(DataType::Text),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Json(_) => Some(DataType::Json),
            Value::Vector(v) => Some(DataType::Vector(v.len() as u32)),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Builds a JSON value in canonical text form.
    pub fn json(value: &serde_json::Value) -> Value {
        Value::Json(value.to_string())
    }

    /// Parses the stored JSON text back into a `serde_json::Value`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Value::Json(s) => serde_json::from_str(s).ok(),
            _ => None,
        }
    }

    /// Interprets the value as a vector, accepting the bracketed text form.
    pub fn to_vector(&self) -> Result<Option<Vec<f32>>> {
        match self {
            Value::Null => Ok(None),
            Value::Vector(v) => Ok(Some(v.clone())),
            Value::Text(s) | Value::Json(s) => parse_vector_literal(s).map(Some),
            other => Err(DbError::type_mismatch(format!(
                "expected VECTOR, found {}",
                other.type_name()
            ))),
        }
    }

    /// SQL comparison. `Ok(None)` means UNKNOWN.
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        use Value::*;

        let ordering = match (self, other) {
            (Null, _) | (_, Null) => return Ok(None),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(_) | Float(_), Integer(_) | Float(_)) => {
                let (a, b) = (self.as_f64().unwrap_or(0.0), other.as_f64().unwrap_or(0.0));
                a.total_cmp(&b)
            }
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.cmp(b),
            (Vector(a), Vector(b)) => compare_vectors(a, b),
            (Text(s), Integer(_) | Float(_)) => match parse_number(s) {
                Some(n) => return n.compare(other),
                None => return Err(incomparable(self, other)),
            },
            (Integer(_) | Float(_), Text(s)) => match parse_number(s) {
                Some(n) => return self.compare(&n),
                None => return Err(incomparable(self, other)),
            },
            (Text(s), Timestamp(b)) => parse_timestamp(s)?.cmp(b),
            (Timestamp(a), Text(s)) => a.cmp(&parse_timestamp(s)?),
            (Text(s), Vector(b)) => compare_vectors(&parse_vector_literal(s)?, b),
            (Vector(a), Text(s)) => compare_vectors(a, &parse_vector_literal(s)?),
            (Text(s), Json(b)) => canonical_json(s)?.cmp(b),
            (Json(a), Text(s)) => a.cmp(&canonical_json(s)?),
            (Text(s), Boolean(b)) => parse_bool(s).ok_or_else(|| incomparable(self, other))?.cmp(b),
            (Boolean(a), Text(s)) => a.cmp(&parse_bool(s).ok_or_else(|| incomparable(self, other))?),
            _ => return Err(incomparable(self, other)),
        };
        Ok(Some(ordering))
    }

    /// Total order used for sorting, grouping and MIN/MAX.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        use Value::*;

        match (self, other) {
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(_) | Float(_), Integer(_) | Float(_)) => self
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&other.as_f64().unwrap_or(0.0)),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.cmp(b),
            (Vector(a), Vector(b)) => compare_vectors(a, b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Timestamp(_) => 4,
            Value::Json(_) => 5,
            Value::Vector(_) => 6,
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, ArithmeticOp::Add)
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, ArithmeticOp::Sub)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, ArithmeticOp::Mul)
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, ArithmeticOp::Div)
    }

    pub fn rem(&self, other: &Value) -> Result<Value> {
        self.arithmetic(other, ArithmeticOp::Rem)
    }

    pub fn negate(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(i
                .checked_neg()
                .map(Value::Integer)
                .unwrap_or(Value::Float(-(*i as f64)))),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(DbError::type_mismatch(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    fn arithmetic(&self, other: &Value, op: ArithmeticOp) -> Result<Value> {
        let lhs = numeric_operand(self)?;
        let rhs = numeric_operand(other)?;

        let (lhs, rhs) = match (lhs, rhs) {
            (Some(l), Some(r)) => (l, r),
            _ => return Ok(Value::Null),
        };

        if let (Value::Integer(a), Value::Integer(b)) = (&lhs, &rhs) {
            let (a, b) = (*a, *b);
            let result = match op {
                ArithmeticOp::Add => a.checked_add(b),
                ArithmeticOp::Sub => a.checked_sub(b),
                ArithmeticOp::Mul => a.checked_mul(b),
                ArithmeticOp::Div => {
                    if b == 0 {
                        return Ok(Value::Null);
                    }
                    a.checked_div(b)
                }
                ArithmeticOp::Rem => {
                    if b == 0 {
                        return Ok(Value::Null);
                    }
                    Some(a.wrapping_rem(b))
                }
            };
            if let Some(v) = result {
                return Ok(Value::Integer(v));
            }
        }

        let a = lhs.as_f64().unwrap_or(0.0);
        let b = rhs.as_f64().unwrap_or(0.0);
        let result = match op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => {
                if b == 0.0 {
                    return Ok(Value::Null);
                }
                a / b
            }
            ArithmeticOp::Rem => {
                if b == 0.0 {
                    return Ok(Value::Null);
                }
                a % b
            }
        };
        Ok(Value::Float(result))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn numeric_operand(value: &Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(_) | Value::Float(_) => Ok(Some(value.clone())),
        Value::Text(s) => parse_number(s).map(Some).ok_or_else(|| {
            DbError::type_mismatch(format!("cannot use text '{}' as a number", s))
        }),
        other => Err(DbError::type_mismatch(format!(
            "arithmetic is not defined for {}",
            other.type_name()
        ))),
    }
}

fn incomparable(a: &Value, b: &Value) -> eyre::Report {
    DbError::type_mismatch(format!(
        "cannot compare {} with {}",
        a.type_name(),
        b.type_name()
    ))
}

fn compare_vectors(a: &[f32], b: &[f32]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.total_cmp(y) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }
    a.len().cmp(&b.len())
}

pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    trimmed.parse::<f64>().ok().map(Value::Float)
}

pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Some(true),
        "false" | "f" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Parses `[v1, v2, ...]` into a float vector.
pub fn parse_vector_literal(s: &str) -> Result<Vec<f32>> {
    let trimmed = s.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| {
            DbError::type_mismatch(format!("invalid vector literal '{}': expected [v1, v2, ...]", s))
        })?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|component| {
            component.trim().parse::<f32>().map_err(|_| {
                DbError::type_mismatch(format!(
                    "invalid vector component '{}' in '{}'",
                    component.trim(),
                    s
                ))
            })
        })
        .collect()
}

/// Parses a timestamp and normalizes it to UTC. Text without an offset is
/// taken to already be UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }

    const OFFSET_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f %:z",
    ];
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::<FixedOffset>::parse_from_str(trimmed, format) {
            return Ok(ts.with_timezone(&Utc));
        }
    }

    let naive_text = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive_text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(DbError::type_mismatch(format!("invalid timestamp '{}'", s)))
}

/// Re-serializes JSON text into canonical form.
pub fn canonical_json(s: &str) -> Result<String> {
    let parsed: serde_json::Value = serde_json::from_str(s)
        .map_err(|e| DbError::type_mismatch(format!("invalid JSON '{}': {}", s, e)))?;
    Ok(parsed.to_string())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits() || a == b,
            (Integer(i), Float(f)) | (Float(f), Integer(i)) => (*i as f64) == *f,
            (Text(a), Text(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (Vector(a), Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                2u8.hash(state);
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    (*f as i64).hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Value::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Timestamp(ts) => {
                4u8.hash(state);
                ts.hash(state);
            }
            Value::Json(s) => {
                5u8.hash(state);
                s.hash(state);
            }
            Value::Vector(v) => {
                6u8.hash(state);
                for component in v {
                    component.to_bits().hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Text(s) | Value::Json(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Vector(v) => {
                write!(f, "[")?;
                for (i, component) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", component)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Vector(v)
    }
}

impl From<&[f32]> for Value {
    fn from(v: &[f32]) -> Self {
        Value::Vector(v.to_vec())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Value::Timestamp(v.with_timezone(&Utc))
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::json(&v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
