//! # Schema Catalog
//!
//! Table, column and index definitions plus the catalog that owns them.
//!
//! ## Structure
//!
//! ```text
//! Catalog (versioned)
//! ├── TableDef "users"
//! │   ├── ColumnDef id INTEGER PRIMARY KEY
//! │   ├── ColumnDef embedding VECTOR(384)
//! │   ├── IndexDef users_pkey (unique B-tree, implicit)
//! │   └── IndexDef users_embedding_idx (HNSW, cosine)
//! └── TableDef "posts"
//!     └── ...
//! ```
//!
//! ## Persistence
//!
//! Definitions derive `serde` and are written as JSON: the whole catalog
//! inside the snapshot file, and one DDL change per WAL frame. Recovery
//! rebuilds the catalog with `Catalog::from_tables` and replays DDL frames in
//! order.
//!
//! ## Concurrency
//!
//! The catalog sits inside the store's `RwLock`. DDL is rare and takes the
//! write side; planning reads it and clones out the `Arc<TableDef>`s it needs.

pub mod catalog;
pub mod table;

pub use catalog::Catalog;
pub use table::{ColumnDef, Constraint, DefaultValue, IndexDef, IndexKind, TableDef};
