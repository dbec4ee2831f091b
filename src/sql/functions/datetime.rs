//! # DateTime Functions
//!
//! - `NOW()` / `CURRENT_TIMESTAMP` - current UTC instant
//! - `STRFTIME(format, timestamp)` - chrono `strftime` formatting

use chrono::Utc;
use eyre::Result;

use crate::error::DbError;
use crate::types::{parse_timestamp, Value};

pub fn now(_args: &[Value]) -> Result<Value> {
    Ok(Value::Timestamp(Utc::now()))
}

pub fn strftime(args: &[Value]) -> Result<Value> {
    let format = match &args[0] {
        Value::Null => return Ok(Value::Null),
        Value::Text(s) => s.clone(),
        other => type_bail!("STRFTIME format must be text, found {}", other.type_name()),
    };
    let ts = match &args[1] {
        Value::Null => return Ok(Value::Null),
        Value::Timestamp(ts) => *ts,
        Value::Text(s) => parse_timestamp(s)?,
        other => {
            return Err(DbError::type_mismatch(format!(
                "STRFTIME expects a timestamp, found {}",
                other.type_name()
            )))
        }
    };

    let mut out = String::new();
    use std::fmt::Write;
    write!(out, "{}", ts.format(&format))
        .map_err(|_| DbError::type_mismatch(format!("invalid STRFTIME format '{}'", format)))?;
    Ok(Value::Text(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strftime_formats_utc() {
        let out = strftime(&[Value::from("%Y-%m-%d %H:%M"), Value::from("2024-03-05T10:20:30Z")]).unwrap();
        assert_eq!(out, Value::from("2024-03-05 10:20"));
    }

    #[test]
    fn now_is_a_timestamp() {
        assert!(matches!(now(&[]).unwrap(), Value::Timestamp(_)));
    }
}
