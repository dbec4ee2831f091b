//! # emberdb CLI
//!
//! Interactive shell over a [`Database`](crate::Database).
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      bin/emberdb.rs                         │
//! │            argument parsing, tracing subscriber             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                         REPL Loop                           │
//! │  rustyline input, dot commands or SQL, result printing      │
//! ├─────────────────────────────────────────────────────────────┤
//! │     Commands          │    Table Formatter    │   History   │
//! │  (.quit, .tables,     │  ASCII box drawing    │  ~/.emberdb │
//! │   .schema, .help)     │  for query results    │  _history   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```bash
//! emberdb                 # in-memory database
//! emberdb ./data          # directory-backed database
//! emberdb "file://./data?sync=normal"
//! ```

pub mod commands;
pub mod history;
pub mod repl;
pub mod table;

pub use repl::Repl;
