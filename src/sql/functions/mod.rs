//! # SQL Functions Module
//!
//! Built-in scalar functions, organized by category. The planner resolves a
//! call once, by upper-cased name and argument count, into a
//! [`ScalarFunction`] whose `eval` pointer the executor invokes per row.
//!
//! ## Module Structure
//!
//! - `string`: LENGTH, UPPER, LOWER, SUBSTR, TRIM, CONCAT, REPLACE, ...
//! - `numeric`: ABS, ROUND, FLOOR, CEIL, SQRT, POWER
//! - `datetime`: NOW, STRFTIME
//! - `vector`: VEC_DISTANCE_L2/COSINE/IP, VEC_DIMS, VEC_NORM, VEC_TO_TEXT
//!
//! Conditional functions (COALESCE, NULLIF, IFNULL) live here.
//!
//! ## NULL Handling
//!
//! Unless a function says otherwise, a NULL argument yields NULL.
//! Aggregates (COUNT, SUM, AVG, MIN, MAX) and ranking functions are not
//! scalar; the planner recognizes them with [`is_aggregate`] and
//! [`is_window_only`] and compiles them into dedicated operators.

pub mod datetime;
pub mod numeric;
pub mod string;
pub mod vector;

use eyre::Result;
use phf::phf_map;

use crate::error::DbError;
use crate::types::Value;

pub type ScalarFn = fn(&[Value]) -> Result<Value>;

#[derive(Debug)]
pub struct ScalarFunction {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub eval: ScalarFn,
}

const VARIADIC: usize = usize::MAX;

macro_rules! scalar {
    ($name:literal, $min:expr, $max:expr, $eval:path) => {
        ScalarFunction {
            name: $name,
            min_args: $min,
            max_args: $max,
            eval: $eval,
        }
    };
}

static SCALAR_FUNCTIONS: phf::Map<&'static str, ScalarFunction> = phf_map! {
    "LENGTH" => scalar!("LENGTH", 1, 1, string::length),
    "UPPER" => scalar!("UPPER", 1, 1, string::upper),
    "LOWER" => scalar!("LOWER", 1, 1, string::lower),
    "SUBSTR" => scalar!("SUBSTR", 2, 3, string::substr),
    "SUBSTRING" => scalar!("SUBSTR", 2, 3, string::substr),
    "TRIM" => scalar!("TRIM", 1, 1, string::trim),
    "LTRIM" => scalar!("LTRIM", 1, 1, string::ltrim),
    "RTRIM" => scalar!("RTRIM", 1, 1, string::rtrim),
    "CONCAT" => scalar!("CONCAT", 1, VARIADIC, string::concat),
    "REPLACE" => scalar!("REPLACE", 3, 3, string::replace),
    "INSTR" => scalar!("INSTR", 2, 2, string::instr),
    "LEFT" => scalar!("LEFT", 2, 2, string::left),
    "RIGHT" => scalar!("RIGHT", 2, 2, string::right),

    "ABS" => scalar!("ABS", 1, 1, numeric::abs),
    "ROUND" => scalar!("ROUND", 1, 2, numeric::round),
    "FLOOR" => scalar!("FLOOR", 1, 1, numeric::floor),
    "CEIL" => scalar!("CEIL", 1, 1, numeric::ceil),
    "CEILING" => scalar!("CEIL", 1, 1, numeric::ceil),
    "SQRT" => scalar!("SQRT", 1, 1, numeric::sqrt),
    "POWER" => scalar!("POWER", 2, 2, numeric::power),
    "POW" => scalar!("POWER", 2, 2, numeric::power),

    "NOW" => scalar!("NOW", 0, 0, datetime::now),
    "STRFTIME" => scalar!("STRFTIME", 2, 2, datetime::strftime),

    "VEC_DISTANCE_L2" => scalar!("VEC_DISTANCE_L2", 2, 2, vector::distance_l2),
    "VEC_DISTANCE_COSINE" => scalar!("VEC_DISTANCE_COSINE", 2, 2, vector::distance_cosine),
    "VEC_DISTANCE_IP" => scalar!("VEC_DISTANCE_IP", 2, 2, vector::distance_ip),
    "VEC_DIMS" => scalar!("VEC_DIMS", 1, 1, vector::dims),
    "VEC_NORM" => scalar!("VEC_NORM", 1, 1, vector::norm),
    "VEC_TO_TEXT" => scalar!("VEC_TO_TEXT", 1, 1, vector::to_text),

    "COALESCE" => scalar!("COALESCE", 1, VARIADIC, coalesce),
    "NULLIF" => scalar!("NULLIF", 2, 2, nullif),
    "IFNULL" => scalar!("IFNULL", 2, 2, ifnull),
};

static AGGREGATES: phf::Set<&'static str> = phf::phf_set! {
    "COUNT", "SUM", "AVG", "MIN", "MAX",
};

static WINDOW_ONLY: phf::Set<&'static str> = phf::phf_set! {
    "ROW_NUMBER", "RANK", "DENSE_RANK", "LAG", "LEAD",
};

/// Resolves a scalar function call, checking its arity.
pub fn resolve(name: &str, argc: usize) -> Result<&'static ScalarFunction> {
    let upper = name.to_ascii_uppercase();
    let Some(function) = SCALAR_FUNCTIONS.get(upper.as_str()) else {
        if is_aggregate(&upper) || is_window_only(&upper) {
            schema_bail!("{} is not allowed in this context", upper);
        }
        schema_bail!("unknown function {}", upper);
    };
    if argc < function.min_args || argc > function.max_args {
        let expected = match (function.min_args, function.max_args) {
            (min, max) if min == max => format!("{}", min),
            (min, VARIADIC) => format!("at least {}", min),
            (min, max) => format!("{} to {}", min, max),
        };
        schema_bail!(
            "{} takes {} argument(s), {} given",
            function.name,
            expected,
            argc
        );
    }
    Ok(function)
}

pub fn is_aggregate(name: &str) -> bool {
    AGGREGATES.contains(name.to_ascii_uppercase().as_str())
}

pub fn is_window_only(name: &str) -> bool {
    WINDOW_ONLY.contains(name.to_ascii_uppercase().as_str())
}

fn coalesce(args: &[Value]) -> Result<Value> {
    Ok(args
        .iter()
        .find(|v| !v.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

fn nullif(args: &[Value]) -> Result<Value> {
    match args[0].compare(&args[1])? {
        Some(std::cmp::Ordering::Equal) => Ok(Value::Null),
        _ => Ok(args[0].clone()),
    }
}

fn ifnull(args: &[Value]) -> Result<Value> {
    if args[0].is_null() {
        Ok(args[1].clone())
    } else {
        Ok(args[0].clone())
    }
}

/// Reads an integer argument, accepting integral floats and numeric text.
pub(crate) fn int_arg(function: &str, value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i)),
        Value::Float(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Value::Text(s) => match crate::types::parse_number(s) {
            Some(Value::Integer(i)) => Ok(Some(i)),
            _ => type_bail!("{} expects an integer argument, found '{}'", function, s),
        },
        other => Err(DbError::type_mismatch(format!(
            "{} expects an integer argument, found {}",
            function,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn call(name: &str, args: &[Value]) -> Value {
        (resolve(name, args.len()).unwrap().eval)(args).unwrap()
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(resolve("length", 1).unwrap().name, "LENGTH");
        assert_eq!(resolve("Ceiling", 1).unwrap().name, "CEIL");
    }

    #[test]
    fn arity_is_checked() {
        let err = resolve("UPPER", 2).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
        assert!(resolve("COALESCE", 7).is_ok());
        assert!(resolve("COALESCE", 0).is_err());
    }

    #[test]
    fn unknown_function_is_schema_error() {
        let err = resolve("FROBNICATE", 1).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
    }

    #[test]
    fn conditional_functions() {
        assert_eq!(
            call("COALESCE", &[Value::Null, Value::Integer(2), Value::Integer(3)]),
            Value::Integer(2)
        );
        assert_eq!(call("NULLIF", &[Value::Integer(1), Value::Integer(1)]), Value::Null);
        assert_eq!(
            call("NULLIF", &[Value::Integer(1), Value::Integer(2)]),
            Value::Integer(1)
        );
        assert_eq!(
            call("IFNULL", &[Value::Null, Value::from("x")]),
            Value::from("x")
        );
    }

    #[test]
    fn aggregate_names_are_recognized() {
        assert!(is_aggregate("count"));
        assert!(!is_aggregate("LENGTH"));
        assert!(is_window_only("ROW_NUMBER"));
        assert!(resolve("SUM", 1).is_err());
    }
}
