//! # Engine Error Taxonomy
//!
//! Every fallible entry point in emberdb returns `eyre::Result`. Errors that a
//! caller may want to react to programmatically are raised as a typed
//! [`DbError`] wrapped in an `eyre::Report`, so context added further up the
//! stack with `wrap_err` never hides the class:
//!
//! ```ignore
//! match db.execute("INSERT INTO t VALUES ($1)", params![1]) {
//!     Err(e) if DbError::kind_of(&e) == Some(ErrorKind::Schema) => { /* duplicate key */ }
//!     other => { other?; }
//! }
//! ```
//!
//! ## Classes
//!
//! | Kind | Raised for |
//! |------|------------|
//! | `Parse` | malformed statement text, unknown keyword, bad literal |
//! | `Schema` | unknown table/column/index, NOT NULL violation, duplicate key |
//! | `TransactionConflict` | commit-time write/write conflict |
//! | `TransactionState` | any use of a committed or rolled back transaction |
//! | `Type` | value not coercible to column type, vector dimension mismatch |
//! | `Io` | durable write or read failure |
//! | `Corruption` | checksum mismatch or malformed persisted data |

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Schema,
    TransactionConflict,
    TransactionState,
    Type,
    Io,
    Corruption,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("parse error at line {line} column {column}: {message}")]
    Parse {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("transaction state error: {0}")]
    TransactionState(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Parse { .. } => ErrorKind::Parse,
            DbError::Schema(_) => ErrorKind::Schema,
            DbError::TransactionConflict(_) => ErrorKind::TransactionConflict,
            DbError::TransactionState(_) => ErrorKind::TransactionState,
            DbError::Type(_) => ErrorKind::Type,
            DbError::Io(_) => ErrorKind::Io,
            DbError::Corruption(_) => ErrorKind::Corruption,
        }
    }

    /// Returns the class of a report raised by the engine, looking through
    /// any context layered on top of it.
    pub fn kind_of(report: &eyre::Report) -> Option<ErrorKind> {
        report.downcast_ref::<DbError>().map(DbError::kind)
    }

    pub fn parse(message: impl Into<String>, line: u32, column: u32) -> eyre::Report {
        eyre::Report::new(DbError::Parse {
            message: message.into(),
            line,
            column,
        })
    }

    pub fn schema(message: impl Into<String>) -> eyre::Report {
        eyre::Report::new(DbError::Schema(message.into()))
    }

    pub fn conflict(message: impl Into<String>) -> eyre::Report {
        eyre::Report::new(DbError::TransactionConflict(message.into()))
    }

    pub fn state(message: impl Into<String>) -> eyre::Report {
        eyre::Report::new(DbError::TransactionState(message.into()))
    }

    pub fn type_mismatch(message: impl Into<String>) -> eyre::Report {
        eyre::Report::new(DbError::Type(message.into()))
    }

    pub fn io(error: std::io::Error) -> eyre::Report {
        eyre::Report::new(DbError::Io(error))
    }

    pub fn corruption(message: impl Into<String>) -> eyre::Report {
        eyre::Report::new(DbError::Corruption(message.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn kind_survives_wrap_err() {
        let result: eyre::Result<()> = Err(DbError::schema("duplicate key"));
        let err = result.wrap_err("insert failed").unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
    }

    #[test]
    fn plain_reports_have_no_kind() {
        let err = eyre::eyre!("something else");
        assert_eq!(DbError::kind_of(&err), None);
    }

    #[test]
    fn parse_error_message_carries_position() {
        let err = DbError::parse("unexpected token", 3, 14);
        assert_eq!(
            err.to_string(),
            "parse error at line 3 column 14: unexpected token"
        );
    }
}
