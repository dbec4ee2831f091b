//! # Parameter Binding
//!
//! Callers pass values for a statement's markers as [`Params`]. Before the
//! statement runs they are checked against the markers the planner
//! recorded (`ParamLayout`) and laid out as [`BoundParams`], which the
//! executor reads by slot.
//!
//! ## Matching Rules
//!
//! | Marker   | Binds                                                   |
//! |----------|---------------------------------------------------------|
//! | `$n`     | the n-th positional value (1-based)                     |
//! | `?`      | numbered left to right, then as `$n`                    |
//! | `:name`  | the entry keyed `name`, else the entry keyed `:name`    |
//! | `@name`  | the entry keyed `name`, else the entry keyed `@name`    |
//!
//! Keys are compared exactly as given; no case folding or trimming.
//! Unused named entries are ignored, but a positional list must supply
//! exactly as many values as the statement uses.

use eyre::Result;

use crate::error::DbError;
use crate::sql::planner::ParamLayout;
use crate::types::Value;

/// Values supplied for one execution of a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(entries) => entries.is_empty(),
        }
    }

    fn lookup(entries: &[(String, Value)], key: &str) -> Option<Value> {
        entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[Value]> for Params {
    fn from(values: &[Value]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(entries: Vec<(String, Value)>) -> Self {
        Params::Named(entries)
    }
}

impl From<Vec<(&str, Value)>> for Params {
    fn from(entries: Vec<(&str, Value)>) -> Self {
        Params::Named(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

impl From<&Params> for Params {
    fn from(params: &Params) -> Self {
        params.clone()
    }
}

/// Parameter values laid out by slot.
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    positional: Vec<Value>,
    named: Vec<Value>,
}

impl BoundParams {
    pub fn positional(&self, slot: usize) -> Result<Value> {
        match self.positional.get(slot) {
            Some(value) => Ok(value.clone()),
            None => Err(DbError::type_mismatch(format!(
                "no value bound for parameter ${}",
                slot + 1
            ))),
        }
    }

    pub fn named(&self, slot: usize) -> Result<Value> {
        match self.named.get(slot) {
            Some(value) => Ok(value.clone()),
            None => Err(DbError::type_mismatch(format!(
                "no value bound for named parameter #{}",
                slot + 1
            ))),
        }
    }
}

/// Checks `params` against the markers in `layout` and lays them out.
pub fn bind(layout: &ParamLayout, params: &Params) -> Result<BoundParams> {
    let expected = layout.positional_count();
    let mut bound = BoundParams::default();

    match params {
        Params::None => {}
        Params::Positional(values) => {
            if !layout.named().is_empty() {
                type_bail!("statement uses named parameters but positional values were supplied");
            }
            if values.len() != expected {
                type_bail!(
                    "statement expects {} parameter(s), {} supplied",
                    expected,
                    values.len()
                );
            }
            bound.positional = values.clone();
        }
        Params::Named(entries) => {
            if expected > 0 {
                type_bail!("statement uses positional parameters but named values were supplied");
            }
            for (sigil, name) in layout.named() {
                let value = Params::lookup(entries, name)
                    .or_else(|| Params::lookup(entries, &format!("{}{}", sigil, name)));
                match value {
                    Some(value) => bound.named.push(value),
                    None => type_bail!("no value bound for parameter {}{}", sigil, name),
                }
            }
        }
    }

    if bound.positional.len() < expected {
        type_bail!("statement expects {} parameter(s), none supplied", expected);
    }
    if let Some((sigil, name)) = layout.named().get(bound.named.len()) {
        type_bail!("no value bound for parameter {}{}", sigil, name);
    }
    Ok(bound)
}
