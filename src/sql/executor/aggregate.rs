//! # Hash Aggregation
//!
//! Consumes the whole input in `open()`, grouping rows by the evaluated
//! GROUP BY key (NULLs group together) and folding each group into one
//! accumulator per aggregate. Output tuples are the group key followed by
//! the aggregate results; groups are emitted in first-seen order.
//!
//! Without GROUP BY the input forms a single group, so an empty input
//! still produces one row: `COUNT` is 0 and every other aggregate NULL.
//!
//! | Aggregate | Input | Result |
//! |-----------|-------|--------|
//! | `COUNT(*)` | every row | INTEGER |
//! | `COUNT(x)` | non-NULL x | INTEGER |
//! | `SUM(x)` | numeric | INTEGER while all inputs are integers, else FLOAT |
//! | `AVG(x)` | numeric | FLOAT |
//! | `MIN/MAX(x)` | any | input type |

use eyre::Result;
use hashbrown::{HashMap, HashSet};
use std::cmp::Ordering;

use super::{drain, eval, ExecContext, Executor, Tuple};
use crate::sql::planner::{AggregateExpr, AggregateFunc, PhysExpr};
use crate::types::Value;

#[derive(Debug, Clone)]
pub(crate) enum Accumulator {
    Count(i64),
    Sum { int: i64, float: f64, is_float: bool, seen: bool },
    Avg { sum: f64, count: i64 },
    Extreme { best: Option<Value>, want: Ordering },
}

impl Accumulator {
    pub(crate) fn new(func: AggregateFunc) -> Self {
        match func {
            AggregateFunc::CountStar | AggregateFunc::Count => Accumulator::Count(0),
            AggregateFunc::Sum => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
                seen: false,
            },
            AggregateFunc::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateFunc::Min => Accumulator::Extreme {
                best: None,
                want: Ordering::Less,
            },
            AggregateFunc::Max => Accumulator::Extreme {
                best: None,
                want: Ordering::Greater,
            },
        }
    }

    /// Folds one input. Callers skip NULLs except for `COUNT(*)`.
    pub(crate) fn update(&mut self, value: &Value) -> Result<()> {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum {
                int,
                float,
                is_float,
                seen,
            } => {
                *seen = true;
                match value {
                    Value::Integer(i) if !*is_float => match int.checked_add(*i) {
                        Some(sum) => *int = sum,
                        None => {
                            *is_float = true;
                            *float = *int as f64 + *i as f64;
                        }
                    },
                    Value::Integer(i) => *float += *i as f64,
                    Value::Float(f) => {
                        if !*is_float {
                            *is_float = true;
                            *float = *int as f64;
                        }
                        *float += f;
                    }
                    other => type_bail!("SUM requires numeric input, found {}", other.type_name()),
                }
            }
            Accumulator::Avg { sum, count } => {
                let f = match value {
                    Value::Integer(i) => *i as f64,
                    Value::Float(f) => *f,
                    other => type_bail!("AVG requires numeric input, found {}", other.type_name()),
                };
                *sum += f;
                *count += 1;
            }
            Accumulator::Extreme { best, want } => {
                let replace = match best {
                    None => true,
                    Some(current) => value.sort_cmp(current) == *want,
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    pub(crate) fn finish(&self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Integer(*n),
            Accumulator::Sum { seen: false, .. } => Value::Null,
            Accumulator::Sum {
                float,
                is_float: true,
                ..
            } => Value::Float(*float),
            Accumulator::Sum { int, .. } => Value::Integer(*int),
            Accumulator::Avg { count: 0, .. } => Value::Null,
            Accumulator::Avg { sum, count } => Value::Float(sum / *count as f64),
            Accumulator::Extreme { best, .. } => best.clone().unwrap_or(Value::Null),
        }
    }
}

/// One aggregate's running state, with the values already folded when the
/// aggregate is DISTINCT.
struct AggregateState {
    accumulator: Accumulator,
    seen: Option<HashSet<Value>>,
}

impl AggregateState {
    fn new(expr: &AggregateExpr) -> Self {
        Self {
            accumulator: Accumulator::new(expr.func),
            seen: expr.distinct.then(HashSet::new),
        }
    }

    fn update(&mut self, expr: &AggregateExpr, row: &[Value], ctx: &ExecContext<'_>) -> Result<()> {
        let Some(arg) = &expr.arg else {
            return self.accumulator.update(&Value::Null);
        };
        let value = eval(arg, row, ctx)?;
        if value.is_null() {
            return Ok(());
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }
        self.accumulator.update(&value)
    }
}

pub struct HashAggregateExec<'p> {
    input: Box<dyn Executor + 'p>,
    group_by: &'p [PhysExpr],
    aggregates: &'p [AggregateExpr],
    output: std::vec::IntoIter<Tuple>,
}

impl<'p> HashAggregateExec<'p> {
    pub fn new(
        input: Box<dyn Executor + 'p>,
        group_by: &'p [PhysExpr],
        aggregates: &'p [AggregateExpr],
    ) -> Self {
        Self {
            input,
            group_by,
            aggregates,
            output: Vec::new().into_iter(),
        }
    }

    fn new_states(&self) -> Vec<AggregateState> {
        self.aggregates.iter().map(AggregateState::new).collect()
    }
}

impl Executor for HashAggregateExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let rows = drain(self.input.as_mut(), ctx)?;

        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<AggregateState>)> = Vec::new();
        for row in &rows {
            let mut key = Vec::with_capacity(self.group_by.len());
            for expr in self.group_by {
                key.push(eval(expr, row, ctx)?);
            }
            let position = match positions.get(&key) {
                Some(&position) => position,
                None => {
                    positions.insert(key.clone(), groups.len());
                    groups.push((key, self.new_states()));
                    groups.len() - 1
                }
            };
            let states = &mut groups[position].1;
            for (state, expr) in states.iter_mut().zip(self.aggregates) {
                state.update(expr, row, ctx)?;
            }
        }

        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Vec::new(), self.new_states()));
        }

        let output: Vec<Tuple> = groups
            .into_iter()
            .map(|(mut key, states)| {
                key.extend(states.iter().map(|s| s.accumulator.finish()));
                key
            })
            .collect();
        self.output = output.into_iter();
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        Ok(self.output.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(func: AggregateFunc, values: &[Value]) -> Value {
        let mut acc = Accumulator::new(func);
        for v in values {
            acc.update(v).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn sum_stays_integer_until_a_float_arrives() {
        assert_eq!(
            fold(AggregateFunc::Sum, &[Value::Integer(2), Value::Integer(3)]),
            Value::Integer(5)
        );
        assert_eq!(
            fold(AggregateFunc::Sum, &[Value::Integer(2), Value::Float(0.5)]),
            Value::Float(2.5)
        );
        assert_eq!(fold(AggregateFunc::Sum, &[]), Value::Null);
    }

    #[test]
    fn avg_and_extremes() {
        let values = [Value::Integer(1), Value::Integer(4), Value::Integer(7)];
        assert_eq!(fold(AggregateFunc::Avg, &values), Value::Float(4.0));
        assert_eq!(fold(AggregateFunc::Min, &values), Value::Integer(1));
        assert_eq!(fold(AggregateFunc::Max, &values), Value::Integer(7));
        assert_eq!(fold(AggregateFunc::Max, &[]), Value::Null);
    }

    #[test]
    fn sum_rejects_text() {
        let mut acc = Accumulator::new(AggregateFunc::Sum);
        assert!(acc.update(&Value::Text("x".into())).is_err());
    }
}
