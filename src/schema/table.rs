//! # Table Definition Module
//!
//! Schema metadata for tables, columns and indexes.
//!
//! ## Table Definition Example
//!
//! ```rust,ignore
//! use emberdb::schema::{ColumnDef, Constraint, IndexDef, IndexKind, TableDef};
//! use emberdb::DataType;
//!
//! let columns = vec![
//!     ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
//!     ColumnDef::new("email", DataType::Text)
//!         .with_constraint(Constraint::NotNull)
//!         .with_constraint(Constraint::Unique),
//!     ColumnDef::new("embedding", DataType::Vector(384)),
//! ];
//!
//! let table = TableDef::new(1, "users", columns)?;
//! assert_eq!(table.indexes()[0].name(), "users_pkey");
//! ```
//!
//! ## Implicit Indexes
//!
//! A table with a primary key always carries a unique B-tree index named
//! `<table>_pkey` as its first index. A column-level `UNIQUE` constraint adds
//! `<table>_<column>_key`. Both are ordinary `IndexDef`s so uniqueness
//! enforcement and access-path selection treat them like user indexes.
//!
//! ## Constraints
//!
//! | Constraint | Description |
//! |------------|-------------|
//! | NotNull | Column cannot contain NULL values |
//! | PrimaryKey | Column is part of the primary key (implies NOT NULL) |
//! | Unique | Column values must be unique among non-NULL values |
//!
//! ## Name Resolution
//!
//! Column and index names compare ASCII case-insensitively; the spelling
//! given at creation time is kept for display.

use chrono::Utc;
use eyre::Result;
use serde::{Deserialize, Serialize};

use crate::hnsw::{DistanceMetric, HnswParams};
use crate::types::{DataType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    NotNull,
    PrimaryKey,
    Unique,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Literal(Value),
    CurrentTimestamp,
}

impl DefaultValue {
    pub fn evaluate(&self) -> Value {
        match self {
            DefaultValue::Literal(v) => v.clone(),
            DefaultValue::CurrentTimestamp => Value::Timestamp(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    name: String,
    data_type: DataType,
    constraints: Vec<Constraint>,
    default: Option<DefaultValue>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraints: Vec::new(),
            default: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_constraint(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    pub fn is_nullable(&self) -> bool {
        !self.has_constraint(Constraint::NotNull) && !self.has_constraint(Constraint::PrimaryKey)
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    BTree,
    Hnsw {
        metric: DistanceMetric,
        params: HnswParams,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    name: String,
    columns: Vec<String>,
    unique: bool,
    kind: IndexKind,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool, kind: IndexKind) -> Self {
        Self {
            name: name.into(),
            columns,
            unique,
            kind,
        }
    }

    pub fn btree(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        Self::new(name, columns, unique, IndexKind::BTree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn is_hnsw(&self) -> bool {
        matches!(self.kind, IndexKind::Hnsw { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    id: u64,
    name: String,
    columns: Vec<ColumnDef>,
    primary_key: Vec<String>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Builds a table definition, deriving the primary key and implicit
    /// unique indexes from column constraints.
    pub fn new(id: u64, name: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self> {
        let primary_key = columns
            .iter()
            .filter(|c| c.has_constraint(Constraint::PrimaryKey))
            .map(|c| c.name().to_string())
            .collect();
        Self::with_primary_key(id, name, columns, primary_key)
    }

    pub fn with_primary_key(
        id: u64,
        name: impl Into<String>,
        mut columns: Vec<ColumnDef>,
        primary_key: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();

        if columns.is_empty() {
            schema_bail!("table '{}' must have at least one column", name);
        }

        for (i, column) in columns.iter().enumerate() {
            let duplicate = columns[..i]
                .iter()
                .any(|c| c.name().eq_ignore_ascii_case(column.name()));
            if duplicate {
                schema_bail!("duplicate column '{}' in table '{}'", column.name(), name);
            }
            if column.name().eq_ignore_ascii_case("rowid") {
                schema_bail!("column name 'rowid' is reserved");
            }
        }

        for pk in &primary_key {
            let Some(column) = columns.iter_mut().find(|c| c.name().eq_ignore_ascii_case(pk)) else {
                schema_bail!("primary key column '{}' not found in table '{}'", pk, name);
            };
            if column.data_type().vector_dims().is_some() {
                schema_bail!("VECTOR column '{}' cannot be part of a primary key", pk);
            }
            column.constraints.retain(|c| *c != Constraint::PrimaryKey);
            column.constraints.push(Constraint::PrimaryKey);
        }

        let mut indexes = Vec::new();
        if !primary_key.is_empty() {
            indexes.push(IndexDef::btree(format!("{}_pkey", name), primary_key.clone(), true));
        }
        for column in &columns {
            let is_sole_pk = primary_key.len() == 1 && primary_key[0].eq_ignore_ascii_case(column.name());
            if column.has_constraint(Constraint::Unique) && !is_sole_pk {
                indexes.push(IndexDef::btree(
                    format!("{}_{}_key", name, column.name()),
                    vec![column.name().to_string()],
                    true,
                ));
            }
        }

        Ok(Self {
            id,
            name,
            columns,
            primary_key,
            indexes,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn get_index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|i| i.name().eq_ignore_ascii_case(name))
    }

    /// Column positions of an index's key, in key order.
    pub fn index_column_positions(&self, index: &IndexDef) -> Vec<usize> {
        index
            .columns()
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect()
    }

    pub(crate) fn add_index(&mut self, index: IndexDef) -> Result<()> {
        if self.get_index(index.name()).is_some() {
            schema_bail!("index '{}' already exists on table '{}'", index.name(), self.name);
        }
        if index.columns().is_empty() {
            schema_bail!("index '{}' must name at least one column", index.name());
        }
        for column in index.columns() {
            if self.column_index(column).is_none() {
                schema_bail!("column '{}' not found in table '{}'", column, self.name);
            }
        }

        if index.is_hnsw() {
            if index.columns().len() != 1 {
                schema_bail!("HNSW index '{}' must cover exactly one column", index.name());
            }
            if index.is_unique() {
                schema_bail!("HNSW index '{}' cannot be UNIQUE", index.name());
            }
            let column = &index.columns()[0];
            let is_vector = self
                .get_column(column)
                .is_some_and(|c| c.data_type().vector_dims().is_some());
            if !is_vector {
                schema_bail!("HNSW index '{}' requires a VECTOR column, '{}' is not", index.name(), column);
            }
        } else {
            for column in index.columns() {
                let is_vector = self
                    .get_column(column)
                    .is_some_and(|c| c.data_type().vector_dims().is_some());
                if is_vector {
                    schema_bail!(
                        "VECTOR column '{}' needs an HNSW index (USING HNSW)",
                        column
                    );
                }
            }
        }

        self.indexes.push(index);
        Ok(())
    }

    pub(crate) fn remove_index(&mut self, name: &str) -> Option<IndexDef> {
        let pos = self.indexes.iter().position(|i| i.name().eq_ignore_ascii_case(name))?;
        Some(self.indexes.remove(pos))
    }
}
