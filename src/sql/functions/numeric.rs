//! # Numeric Functions
//!
//! - `ABS(x)`
//! - `ROUND(x[, digits])` - half away from zero; integers stay integers
//! - `FLOOR(x)`, `CEIL(x)` - integers stay integers, floats stay floats
//! - `SQRT(x)` - NULL for negative input
//! - `POWER(x, y)` - always a float

use eyre::Result;

use super::int_arg;
use crate::error::DbError;
use crate::types::{parse_number, Value};

fn number(function: &str, value: &Value) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(_) | Value::Float(_) => Ok(Some(value.clone())),
        Value::Text(s) => match parse_number(s) {
            Some(n) => Ok(Some(n)),
            None => type_bail!("{} expects a number, found '{}'", function, s),
        },
        other => Err(DbError::type_mismatch(format!(
            "{} expects a number, found {}",
            function,
            other.type_name()
        ))),
    }
}

pub fn abs(args: &[Value]) -> Result<Value> {
    Ok(match number("ABS", &args[0])? {
        Some(Value::Integer(i)) => i
            .checked_abs()
            .map(Value::Integer)
            .unwrap_or(Value::Float((i as f64).abs())),
        Some(Value::Float(f)) => Value::Float(f.abs()),
        _ => Value::Null,
    })
}

pub fn round(args: &[Value]) -> Result<Value> {
    let digits = match args.get(1) {
        Some(v) => match int_arg("ROUND", v)? {
            Some(d) => d.clamp(-18, 18) as i32,
            None => return Ok(Value::Null),
        },
        None => 0,
    };

    Ok(match number("ROUND", &args[0])? {
        Some(Value::Integer(i)) if digits >= 0 => Value::Integer(i),
        Some(v) => {
            let f = v.as_f64().unwrap_or(0.0);
            let scale = 10f64.powi(digits);
            Value::Float((f * scale).round() / scale)
        }
        None => Value::Null,
    })
}

pub fn floor(args: &[Value]) -> Result<Value> {
    Ok(match number("FLOOR", &args[0])? {
        Some(Value::Float(f)) => Value::Float(f.floor()),
        Some(other) => other,
        None => Value::Null,
    })
}

pub fn ceil(args: &[Value]) -> Result<Value> {
    Ok(match number("CEIL", &args[0])? {
        Some(Value::Float(f)) => Value::Float(f.ceil()),
        Some(other) => other,
        None => Value::Null,
    })
}

pub fn sqrt(args: &[Value]) -> Result<Value> {
    Ok(match number("SQRT", &args[0])? {
        Some(v) => {
            let f = v.as_f64().unwrap_or(0.0);
            if f < 0.0 {
                Value::Null
            } else {
                Value::Float(f.sqrt())
            }
        }
        None => Value::Null,
    })
}

pub fn power(args: &[Value]) -> Result<Value> {
    Ok(match (number("POWER", &args[0])?, number("POWER", &args[1])?) {
        (Some(base), Some(exp)) => {
            Value::Float(base.as_f64().unwrap_or(0.0).powf(exp.as_f64().unwrap_or(0.0)))
        }
        _ => Value::Null,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_keeps_integers() {
        assert_eq!(round(&[Value::Integer(7)]).unwrap(), Value::Integer(7));
        assert_eq!(round(&[Value::Float(2.346), Value::Integer(2)]).unwrap(), Value::Float(2.35));
        assert_eq!(round(&[Value::Float(-2.5)]).unwrap(), Value::Float(-3.0));
    }

    #[test]
    fn abs_floor_ceil() {
        assert_eq!(abs(&[Value::Integer(-4)]).unwrap(), Value::Integer(4));
        assert_eq!(floor(&[Value::Float(1.7)]).unwrap(), Value::Float(1.0));
        assert_eq!(ceil(&[Value::Float(1.2)]).unwrap(), Value::Float(2.0));
        assert_eq!(ceil(&[Value::Integer(3)]).unwrap(), Value::Integer(3));
    }

    #[test]
    fn sqrt_of_negative_is_null() {
        assert_eq!(sqrt(&[Value::Integer(-1)]).unwrap(), Value::Null);
        assert_eq!(sqrt(&[Value::Integer(9)]).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn non_numeric_text_is_type_error() {
        assert!(abs(&[Value::from("abc")]).is_err());
        assert_eq!(abs(&[Value::from("-2")]).unwrap(), Value::Integer(2));
    }

    #[test]
    fn power_is_float() {
        assert_eq!(power(&[Value::Integer(2), Value::Integer(10)]).unwrap(), Value::Float(1024.0));
    }
}
