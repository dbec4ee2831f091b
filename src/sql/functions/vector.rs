//! # Vector Functions
//!
//! Distance functions share their kernels with the HNSW index, so
//! `ORDER BY VEC_DISTANCE_L2(col, $1)` ranks rows exactly as an index on
//! `col` with `metric = 'l2'` would.
//!
//! | Function | Result |
//! |----------|--------|
//! | `VEC_DISTANCE_L2(a, b)` | Euclidean distance |
//! | `VEC_DISTANCE_COSINE(a, b)` | 1 - cosine similarity |
//! | `VEC_DISTANCE_IP(a, b)` | negative dot product |
//! | `VEC_DIMS(v)` | dimension count |
//! | `VEC_NORM(v)` | Euclidean norm |
//! | `VEC_TO_TEXT(v)` | `[v1, v2, ...]` |
//!
//! Arguments may be vectors or bracketed text literals. Mismatched
//! dimensions are a type error.

use eyre::Result;

use crate::hnsw::distance::norm as vector_norm;
use crate::hnsw::DistanceMetric;
use crate::types::Value;

fn distance(metric: DistanceMetric, args: &[Value]) -> Result<Value> {
    let (Some(a), Some(b)) = (args[0].to_vector()?, args[1].to_vector()?) else {
        return Ok(Value::Null);
    };
    if a.len() != b.len() {
        type_bail!(
            "{}: vector dimensions differ ({} vs {})",
            metric.sql_function(),
            a.len(),
            b.len()
        );
    }
    Ok(Value::Float(metric.distance(&a, &b) as f64))
}

pub fn distance_l2(args: &[Value]) -> Result<Value> {
    distance(DistanceMetric::L2, args)
}

pub fn distance_cosine(args: &[Value]) -> Result<Value> {
    distance(DistanceMetric::Cosine, args)
}

pub fn distance_ip(args: &[Value]) -> Result<Value> {
    distance(DistanceMetric::InnerProduct, args)
}

pub fn dims(args: &[Value]) -> Result<Value> {
    Ok(match args[0].to_vector()? {
        Some(v) => Value::Integer(v.len() as i64),
        None => Value::Null,
    })
}

pub fn norm(args: &[Value]) -> Result<Value> {
    Ok(match args[0].to_vector()? {
        Some(v) => Value::Float(vector_norm(&v) as f64),
        None => Value::Null,
    })
}

pub fn to_text(args: &[Value]) -> Result<Value> {
    Ok(match args[0].to_vector()? {
        Some(v) => Value::Text(Value::Vector(v).to_string()),
        None => Value::Null,
    })
}
