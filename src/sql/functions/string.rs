//! # String Functions
//!
//! - `LENGTH(str)` - character count
//! - `UPPER(str)`, `LOWER(str)`
//! - `SUBSTR(str, pos[, len])` - 1-based, `pos` may be negative to count from the end
//! - `TRIM(str)`, `LTRIM(str)`, `RTRIM(str)`
//! - `CONCAT(s1, s2, ...)` - NULL arguments are skipped
//! - `REPLACE(str, from, to)`, `INSTR(str, substr)`
//! - `LEFT(str, n)`, `RIGHT(str, n)`
//!
//! Non-text arguments are converted with their display form, so
//! `LENGTH(12345)` is 5.

use eyre::Result;

use super::int_arg;
use crate::types::Value;

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(s) | Value::Json(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn map_text(args: &[Value], f: impl FnOnce(&str) -> Value) -> Result<Value> {
    Ok(match text(&args[0]) {
        Some(s) => f(&s),
        None => Value::Null,
    })
}

pub fn length(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Integer(s.chars().count() as i64))
}

pub fn upper(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Text(s.to_uppercase()))
}

pub fn lower(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Text(s.to_lowercase()))
}

pub fn trim(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Text(s.trim().to_string()))
}

pub fn ltrim(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Text(s.trim_start().to_string()))
}

pub fn rtrim(args: &[Value]) -> Result<Value> {
    map_text(args, |s| Value::Text(s.trim_end().to_string()))
}

pub fn substr(args: &[Value]) -> Result<Value> {
    let Some(s) = text(&args[0]) else {
        return Ok(Value::Null);
    };
    let Some(start) = int_arg("SUBSTR", &args[1])? else {
        return Ok(Value::Null);
    };
    let len = match args.get(2) {
        Some(v) => match int_arg("SUBSTR", v)? {
            Some(n) => Some(n.max(0) as usize),
            None => return Ok(Value::Null),
        },
        None => None,
    };

    let chars: Vec<char> = s.chars().collect();
    let count = chars.len() as i64;
    let begin = if start > 0 {
        start - 1
    } else if start < 0 {
        (count + start).max(0)
    } else {
        0
    };
    let begin = begin.min(count) as usize;
    let end = match len {
        Some(n) => (begin + n).min(chars.len()),
        None => chars.len(),
    };
    Ok(Value::Text(chars[begin..end].iter().collect()))
}

pub fn concat(args: &[Value]) -> Result<Value> {
    let mut out = String::new();
    for arg in args {
        if let Some(s) = text(arg) {
            out.push_str(&s);
        }
    }
    Ok(Value::Text(out))
}

pub fn replace(args: &[Value]) -> Result<Value> {
    match (text(&args[0]), text(&args[1]), text(&args[2])) {
        (Some(s), Some(from), Some(to)) if !from.is_empty() => Ok(Value::Text(s.replace(&from, &to))),
        (Some(s), Some(_), Some(_)) => Ok(Value::Text(s)),
        _ => Ok(Value::Null),
    }
}

pub fn instr(args: &[Value]) -> Result<Value> {
    match (text(&args[0]), text(&args[1])) {
        (Some(s), Some(needle)) => Ok(Value::Integer(match s.find(&needle) {
            Some(byte) => s[..byte].chars().count() as i64 + 1,
            None => 0,
        })),
        _ => Ok(Value::Null),
    }
}

pub fn left(args: &[Value]) -> Result<Value> {
    let (Some(s), Some(n)) = (text(&args[0]), int_arg("LEFT", &args[1])?) else {
        return Ok(Value::Null);
    };
    Ok(Value::Text(s.chars().take(n.max(0) as usize).collect()))
}

pub fn right(args: &[Value]) -> Result<Value> {
    let (Some(s), Some(n)) = (text(&args[0]), int_arg("RIGHT", &args[1])?) else {
        return Ok(Value::Null);
    };
    let count = s.chars().count();
    let skip = count.saturating_sub(n.max(0) as usize);
    Ok(Value::Text(s.chars().skip(skip).collect()))
}
