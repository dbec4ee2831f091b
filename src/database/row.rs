use chrono::{DateTime, Utc};
use eyre::{bail, Result};
use std::sync::Arc;

use crate::types::Value;

/// Addresses a column of a [`Row`] by position or by name.
pub trait ColumnIndex {
    fn position(&self, columns: &[String]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, columns: &[String]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn position(&self, columns: &[String]) -> Option<usize> {
        columns
            .iter()
            .position(|c| c.as_str() == *self)
            .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(self)))
    }
}

impl ColumnIndex for String {
    fn position(&self, columns: &[String]) -> Option<usize> {
        self.as_str().position(columns)
    }
}

/// One result row: values keyed by the result set's column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column. An exact match wins over a
    /// case-insensitive one.
    pub fn get(&self, name: &str) -> Option<&Value> {
        name.position(&self.columns).map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterates `(column, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }

    fn value<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<&Value> {
        match index.position(&self.columns) {
            Some(i) => Ok(&self.values[i]),
            None => bail!("column {:?} not found in result", index),
        }
    }

    pub fn is_null<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<bool> {
        Ok(self.value(index)?.is_null())
    }

    pub fn get_i64<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<i64> {
        match self.value(index)? {
            Value::Integer(i) => Ok(*i),
            other => bail!("expected INTEGER, got {}", other.type_name()),
        }
    }

    /// Integers widen to f64.
    pub fn get_f64<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<f64> {
        match self.value(index)? {
            Value::Float(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => bail!("expected FLOAT, got {}", other.type_name()),
        }
    }

    /// TEXT and JSON columns both read as text.
    pub fn get_str<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<&str> {
        match self.value(index)? {
            Value::Text(s) | Value::Json(s) => Ok(s),
            other => bail!("expected TEXT, got {}", other.type_name()),
        }
    }

    pub fn get_bool<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<bool> {
        match self.value(index)? {
            Value::Boolean(b) => Ok(*b),
            other => bail!("expected BOOLEAN, got {}", other.type_name()),
        }
    }

    pub fn get_vector<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<&[f32]> {
        match self.value(index)? {
            Value::Vector(v) => Ok(v),
            other => bail!("expected VECTOR, got {}", other.type_name()),
        }
    }

    pub fn get_timestamp<I: ColumnIndex + std::fmt::Debug>(&self, index: I) -> Result<DateTime<Utc>> {
        match self.value(index)? {
            Value::Timestamp(ts) => Ok(*ts),
            other => bail!("expected TIMESTAMP, got {}", other.type_name()),
        }
    }
}

/// A result set with its column names kept apart from the row values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts into name-addressable rows sharing one column list.
    pub fn into_rows(self) -> Vec<Row> {
        let columns: Arc<[String]> = self.columns.into();
        self.rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect()
    }
}
