//! # SQL Processing Module
//!
//! Text in, rows out:
//!
//! ```text
//! SQL ──> Lexer ──> Parser ──> Statement (AST)
//!                                  │
//!                   Catalog ──> Planner ──> Plan / PhysicalPlan
//!                                  │
//!          snapshot + WriteSet ──> Executor ──> tuples
//! ```
//!
//! ## Module Structure
//!
//! - `token`: Token and keyword definitions
//! - `lexer`: Zero-copy SQL tokenizer
//! - `parser`: Recursive descent parser producing `ast::Statement`
//! - `functions`: Built-in scalar functions
//! - `planner`: Name resolution, access path choice, physical plans
//! - `executor`: Volcano-style operators over MVCC snapshots
//!
//! ## Supported SQL
//!
//! - DDL: CREATE/DROP TABLE, CREATE [UNIQUE] INDEX (B-tree or HNSW), DROP INDEX
//! - DML: SELECT, INSERT (VALUES or query), UPDATE, DELETE
//! - Queries: joins, subqueries, CTEs, window functions, UNION [ALL]
//! - Transactions: BEGIN, COMMIT, ROLLBACK
//! - Introspection: SHOW TABLES, EXPLAIN, PRAGMA
//!
//! ## Example
//!
//! ```ignore
//! use emberdb::sql::parse_statement;
//!
//! let stmt = parse_statement("SELECT id, name FROM users WHERE active = true")?;
//! ```

pub mod ast;
pub mod executor;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod planner;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse_statement, Parser};
pub use token::{Keyword, Parameter, Span, Token};

