//! # Type System
//!
//! Canonical scalar kinds and their coercion rules.
//!
//! ## Module Structure
//!
//! - `data_type`: declared column types and write-time coercion
//! - `value`: runtime `Value` with SQL comparison, arithmetic and parsing
//!
//! ## Usage
//!
//! ```ignore
//! use emberdb::types::{DataType, Value};
//!
//! let v = DataType::Vector(3).coerce(Value::from("[0.1, 0.2, 0.3]"))?;
//! assert_eq!(v.as_vector().map(|v| v.len()), Some(3));
//! ```

mod data_type;
mod value;

pub use data_type::DataType;
pub use value::{canonical_json, parse_timestamp, parse_vector_literal, Value};
pub(crate) use value::parse_number;

/// Internal row identity. Assigned once at insert and stable across updates.
pub type RowId = u64;

/// Transaction identifier handed out by `begin`.
pub type TxnId = u64;

/// Logical commit timestamp. Snapshots read every version whose commit
/// timestamp is at or below their read timestamp.
pub type CommitTs = u64;
