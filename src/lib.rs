//! # emberdb - Embedded SQL with MVCC and Vector Search
//!
//! emberdb is an embedded, single-process SQL engine. It offers snapshot
//! isolated transactions over a multi-version row store, a planner and
//! Volcano-style executor (joins, subqueries, CTEs, grouping, window
//! functions), ordered B-tree indexes and HNSW indexes for approximate
//! nearest-neighbor search over `VECTOR(n)` columns.
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberdb::{params, Database};
//!
//! let db = Database::open(":memory:")?;
//! db.execute("CREATE TABLE docs (id INTEGER PRIMARY KEY, body TEXT, emb VECTOR(3))", ())?;
//! db.execute(
//!     "INSERT INTO docs VALUES ($1, $2, $3)",
//!     params![1, "hello", vec![1.0f32, 0.0, 0.0]],
//! )?;
//! db.execute("CREATE INDEX docs_emb ON docs(emb) USING HNSW WITH (metric = 'cosine')", ())?;
//!
//! let nearest = db.query(
//!     "SELECT id FROM docs ORDER BY VEC_DISTANCE_COSINE(emb, $1) LIMIT 5",
//!     params!["[0.9, 0.1, 0]"],
//! )?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Database / Transaction / PreparedStatement  │
//! ├──────────────────────────────────────────────┤
//! │  sql: lexer → parser → planner → executor    │
//! ├───────────────────────┬──────────────────────┤
//! │  schema (catalog)     │  mvcc (snapshots,    │
//! │                       │  write sets)         │
//! ├───────────────────────┴──────────────────────┤
//! │  storage: versioned rows per table           │
//! │  index: ordered B-tree   hnsw: vector graph  │
//! ├──────────────────────────────────────────────┤
//! │  durability: WAL frames + checkpoint image   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`database`]: public API, configuration, transactions, results
//! - [`sql`]: SQL front end, planner and executor
//! - [`types`]: `Value`, `DataType` and coercion
//! - [`schema`]: table and index definitions, catalog
//! - [`mvcc`]: transaction manager, version chains, write sets
//! - [`storage`]: table stores, WAL, snapshot, recovery
//! - [`index`]: ordered secondary indexes
//! - [`hnsw`]: HNSW graph and distance metrics
//! - [`encoding`]: order-preserving index keys and row records
//! - [`error`]: the `DbError` taxonomy

#[macro_use]
mod macros;

pub mod cli;
pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod mvcc;
pub mod schema;
pub mod sql;
pub mod storage;
pub mod types;

pub use database::{
    Database, DatabaseBuilder, DatabaseConfig, ExecuteResult, Params, PreparedStatement,
    QueryResult, Row, SyncMode, Transaction,
};
pub use error::{DbError, ErrorKind};
pub use hnsw::DistanceMetric;
pub use types::{DataType, Value};
