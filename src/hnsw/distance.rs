//! # Vector Distance Functions
//!
//! Distance computations shared by the HNSW graph and the `VEC_DISTANCE_*`
//! SQL functions. Smaller is always closer, so every metric can drive the
//! same min-heap search.
//!
//! ## Supported Distance Metrics
//!
//! - **Euclidean (L2)**: `sqrt(sum((a-b)²))`
//! - **Cosine**: `1 - dot(a,b)/(|a|*|b|)`, and `1.0` when either norm is zero
//! - **Inner Product**: `-dot(a,b)` (negated so larger products sort first)
//!
//! ## Usage Pattern
//!
//! ```text
//! let distance_fn = select_distance_fn(DistanceMetric::L2);
//! let dist = distance_fn(query, candidate);
//! ```
//!
//! Distance functions take slices directly and never allocate. The caller is
//! responsible for ensuring slices have equal lengths; extra trailing
//! components of the longer slice are ignored.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    #[default]
    L2,
    Cosine,
    InnerProduct,
}

impl DistanceMetric {
    /// Parses the `metric = '...'` option of `CREATE INDEX ... USING HNSW`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "cosine" => Ok(DistanceMetric::Cosine),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::InnerProduct),
            other => Err(DbError::schema(format!(
                "unknown distance metric '{}': expected 'l2', 'cosine' or 'ip'",
                other
            ))),
        }
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        select_distance_fn(*self)(a, b)
    }

    /// Name of the SQL function computing this metric.
    pub fn sql_function(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "VEC_DISTANCE_L2",
            DistanceMetric::Cosine => "VEC_DISTANCE_COSINE",
            DistanceMetric::InnerProduct => "VEC_DISTANCE_IP",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::L2 => write!(f, "l2"),
            DistanceMetric::Cosine => write!(f, "cosine"),
            DistanceMetric::InnerProduct => write!(f, "ip"),
        }
    }
}

pub type DistanceFn = fn(&[f32], &[f32]) -> f32;

pub fn select_distance_fn(metric: DistanceMetric) -> DistanceFn {
    match metric {
        DistanceMetric::L2 => euclidean,
        DistanceMetric::Cosine => cosine,
        DistanceMetric::InnerProduct => inner_product,
    }
}

pub fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let diff = x - y;
        sum += diff * diff;
    }
    sum
}

pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    euclidean_squared(a, b).sqrt()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    -dot_product(a, b)
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_product = (norm_a * norm_b).sqrt();
    if norm_product == 0.0 {
        return 1.0;
    }

    1.0 - (dot / norm_product)
}

pub fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}
