//! # Database Module
//!
//! The public API of the engine: opening a database, running statements,
//! transactions, prepared statements and result access.
//!
//! ## Statement Pipeline
//!
//! ```text
//! SQL text
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 1. PARSE: Lexer → Parser → Statement                │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 2. PLAN: catalog lookup → PlannedStatement          │
//! │    (plan + the parameter markers it uses)           │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 3. BIND: Params checked against markers             │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ┌─────────────────────────────────────────────────────┐
//! │ 4. EXECUTE: pull rows through the operator tree at  │
//! │    the transaction's snapshot, or stage writes      │
//! └─────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! ExecuteResult → affected count / Vec<Row> / QueryResult
//! ```
//!
//! ## Thread Safety
//!
//! `Database` is `Send + Sync`. Readers never block writers: a query holds
//! the store's read lock only while it fetches rows, and commits take the
//! write lock only to append versions. Transactions and prepared
//! statements borrow the handle that created them, so a handle cannot be
//! closed while either is alive.
//!
//! ## Usage
//!
//! ```ignore
//! use emberdb::{params, Database};
//!
//! let db = Database::open("file://./data?sync=normal")?;
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", ())?;
//! db.execute("INSERT INTO users VALUES ($1, $2)", params![1, "Alice"])?;
//!
//! let mut tx = db.begin()?;
//! tx.execute("UPDATE users SET name = 'Ada' WHERE id = 1", ())?;
//! tx.commit()?;
//!
//! let row = db.query_one("SELECT name FROM users WHERE id = $1", params![1])?;
//! ```

pub mod builder;
pub mod config;
#[allow(clippy::module_inception)]
mod database;
pub mod params;
mod pragma;
pub mod prepared;
pub mod row;
pub mod script;
pub mod transaction;

pub use builder::DatabaseBuilder;
pub use config::{DatabaseConfig, Dsn, Location, SyncMode};
pub use database::Database;
pub use params::{BoundParams, Params};
pub use prepared::PreparedStatement;
pub use row::{ColumnIndex, QueryResult, Row};
pub use transaction::Transaction;

/// Outcome of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    Rows(QueryResult),
    Affected(u64),
    CreateTable { created: bool },
    CreateIndex { created: bool },
    DropTable { dropped: bool },
    DropIndex { dropped: bool },
    Begin,
    Commit,
    Rollback,
}

impl ExecuteResult {
    /// Rows written by INSERT, UPDATE or DELETE; 0 for anything else.
    pub fn affected(self) -> u64 {
        match self {
            ExecuteResult::Affected(n) => n,
            _ => 0,
        }
    }

    /// The result set; empty for statements that return no rows.
    pub fn into_result(self) -> QueryResult {
        match self {
            ExecuteResult::Rows(result) => result,
            _ => QueryResult::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, ErrorKind};
    use crate::types::Value;

    fn db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER DEFAULT 0)",
            (),
        )
        .unwrap();
        db
    }

    #[test]
    fn insert_and_query_back() {
        let db = db();
        let n = db
            .execute("INSERT INTO items (id, name) VALUES ($1, $2), ($3, $4)", params![1, "a", 2, "b"])
            .unwrap();
        assert_eq!(n, 2);
        let rows = db.query("SELECT id, name, qty FROM items ORDER BY id", ()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("name"), Some(&Value::Text("b".into())));
        assert_eq!(rows[0].get("qty"), Some(&Value::Integer(0)));
    }

    #[test]
    fn session_transaction_via_sql() {
        let db = db();
        db.execute("BEGIN", ()).unwrap();
        assert!(db.in_transaction());
        db.execute("INSERT INTO items (id, name) VALUES (1, 'x')", ()).unwrap();

        let other = db.clone();
        assert!(other.query_one("SELECT * FROM items", ()).unwrap().is_none());

        db.execute("ROLLBACK", ()).unwrap();
        assert!(!db.in_transaction());
        assert!(db.query_one("SELECT * FROM items", ()).unwrap().is_none());

        let err = db.execute("COMMIT", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::TransactionState));
    }

    #[test]
    fn result_shapes() {
        let db = db();
        db.execute("INSERT INTO items (id, name) VALUES (1, 'x')", ()).unwrap();
        let raw = db.query_raw("SELECT id, name FROM items", ()).unwrap();
        assert_eq!(raw.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(raw.rows, vec![vec![Value::Integer(1), Value::Text("x".into())]]);

        match db.run("CREATE TABLE IF NOT EXISTS items (id INTEGER)", ()).unwrap() {
            ExecuteResult::CreateTable { created } => assert!(!created),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn closed_database_rejects_statements() {
        let db = db();
        let other = db.clone();
        db.close().unwrap();
        let err = other.execute("SELECT 1", ()).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::TransactionState));
    }
}
