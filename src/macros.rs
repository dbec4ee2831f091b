//! # Internal Macros
//!
//! Shorthands for raising typed engine errors and for building parameter
//! lists.
//!
//! ## Error macros
//!
//! `schema_bail!`, `type_bail!` and `state_bail!` return early with an
//! `eyre::Report` wrapping the matching [`DbError`](crate::DbError) variant,
//! mirroring `eyre::bail!`:
//!
//! ```ignore
//! if column.is_none() {
//!     schema_bail!("column '{}' not found in table '{}'", name, table);
//! }
//! ```
//!
//! ## Parameter macros
//!
//! ```ignore
//! db.execute("INSERT INTO users VALUES ($1, $2)", params![1, "Alice"])?;
//! db.query("SELECT * FROM users WHERE id = :id", named_params! { "id" => 1 })?;
//! ```

#[macro_export]
macro_rules! schema_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::DbError::schema(format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! type_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::DbError::type_mismatch(format!($($arg)*)))
    };
}

#[macro_export]
macro_rules! state_bail {
    ($($arg:tt)*) => {
        return Err($crate::error::DbError::state(format!($($arg)*)))
    };
}

/// Builds positional [`Params`](crate::Params) from a list of values.
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::None
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(vec![$($crate::Value::from($value)),+])
    };
}

/// Builds named [`Params`](crate::Params) from `key => value` pairs.
#[macro_export]
macro_rules! named_params {
    () => {
        $crate::Params::None
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Params::Named(vec![$((String::from($key), $crate::Value::from($value))),+])
    };
}
