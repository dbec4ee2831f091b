//! # Column Data Types
//!
//! The declared type vocabulary of a column and the coercion rules applied
//! when a value is written into it.
//!
//! | Declared as | DataType |
//! |-------------|----------|
//! | INTEGER, INT, BIGINT, SMALLINT | Integer |
//! | FLOAT, REAL, DOUBLE, DECIMAL, NUMERIC | Float |
//! | TEXT, VARCHAR(n), CHAR(n), STRING | Text |
//! | BOOLEAN, BOOL | Boolean |
//! | TIMESTAMP, DATETIME, DATE, TIMESTAMPTZ | Timestamp |
//! | JSON, JSONB | Json |
//! | VECTOR(n) | Vector(n) |
//!
//! ## Coercion on write
//!
//! `coerce` is strict: it accepts values that convert without losing meaning
//! (an integral float into INTEGER, an offset timestamp into UTC, a
//! `'[0.1, 0.2]'` literal into VECTOR) and raises a type error otherwise.
//! `cast` implements `CAST(x AS type)` and is lenient in the usual SQL way
//! (FLOAT to INTEGER truncates, anything renders to TEXT).

use chrono::{TimeZone, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::{canonical_json, parse_bool, parse_number, parse_timestamp};
use super::Value;
use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
    Vector(u32),
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    pub fn vector_dims(&self) -> Option<u32> {
        match self {
            DataType::Vector(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a value for storage in a column of this type.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match (self, value) {
            (DataType::Integer, Value::Integer(i)) => Ok(Value::Integer(i)),
            (DataType::Integer, Value::Float(f)) => {
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                    Ok(Value::Integer(f as i64))
                } else {
                    Err(mismatch(self, &Value::Float(f)))
                }
            }
            (DataType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Integer(i)),
                Err(_) => Err(mismatch(self, &Value::Text(s))),
            },

            (DataType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (DataType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (DataType::Float, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Err(mismatch(self, &Value::Text(s))),
            },

            (DataType::Text, Value::Text(s)) => Ok(Value::Text(s)),
            (DataType::Text, Value::Json(s)) => Ok(Value::Text(s)),
            (DataType::Text, v @ (Value::Integer(_) | Value::Float(_) | Value::Boolean(_))) => {
                Ok(Value::Text(v.to_string()))
            }
            (DataType::Text, Value::Timestamp(ts)) => Ok(Value::Text(Value::Timestamp(ts).to_string())),

            (DataType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
            (DataType::Boolean, Value::Text(s)) => match parse_bool(&s) {
                Some(b) => Ok(Value::Boolean(b)),
                None => Err(mismatch(self, &Value::Text(s))),
            },

            (DataType::Timestamp, Value::Timestamp(ts)) => Ok(Value::Timestamp(ts)),
            (DataType::Timestamp, Value::Text(s)) => parse_timestamp(&s).map(Value::Timestamp),
            (DataType::Timestamp, Value::Integer(secs)) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(self, &Value::Integer(secs))),

            (DataType::Json, Value::Json(s)) => Ok(Value::Json(s)),
            (DataType::Json, Value::Text(s)) => canonical_json(&s).map(Value::Json),
            (DataType::Json, Value::Integer(i)) => Ok(Value::Json(i.to_string())),
            (DataType::Json, Value::Float(f)) => Ok(Value::json(&serde_json::json!(f))),
            (DataType::Json, Value::Boolean(b)) => Ok(Value::Json(b.to_string())),
            (DataType::Json, Value::Vector(v)) => Ok(Value::json(&serde_json::json!(v))),

            (DataType::Vector(dims), value @ (Value::Vector(_) | Value::Text(_) | Value::Json(_))) => {
                let vector = value.to_vector()?.unwrap_or_default();
                if vector.len() != *dims as usize {
                    return Err(DbError::type_mismatch(format!(
                        "vector dimension mismatch: expected {}, got {}",
                        dims,
                        vector.len()
                    )));
                }
                Ok(Value::Vector(vector))
            }

            (_, value) => Err(mismatch(self, &value)),
        }
    }

    /// Implements `CAST(value AS type)`.
    pub fn cast(&self, value: Value) -> Result<Value> {
        match (self, &value) {
            (_, Value::Null) => Ok(Value::Null),
            (DataType::Integer, Value::Float(f)) => Ok(Value::Integer(f.trunc() as i64)),
            (DataType::Integer, Value::Boolean(b)) => Ok(Value::Integer(*b as i64)),
            (DataType::Integer, Value::Text(s)) => match parse_number(s) {
                Some(Value::Float(f)) => Ok(Value::Integer(f.trunc() as i64)),
                Some(n) => Ok(n),
                None => Err(mismatch(self, &value)),
            },
            (DataType::Float, Value::Boolean(b)) => Ok(Value::Float(*b as i64 as f64)),
            (DataType::Text, _) => Ok(Value::Text(value.to_string())),
            (DataType::Boolean, Value::Integer(i)) => Ok(Value::Boolean(*i != 0)),
            (DataType::Boolean, Value::Float(f)) => Ok(Value::Boolean(*f != 0.0)),
            _ => self.coerce(value),
        }
    }
}

fn mismatch(target: &DataType, value: &Value) -> eyre::Report {
    DbError::type_mismatch(format!(
        "cannot store {} value '{}' in a {} column",
        value.type_name(),
        value,
        target
    ))
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Text => write!(f, "TEXT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Json => write!(f, "JSON"),
            DataType::Vector(n) => write!(f, "VECTOR({})", n),
        }
    }
}
