//! # Window Functions
//!
//! `WindowExec` materializes its input and appends one column per window
//! function; rows leave in their input order.
//!
//! For each function the rows are split into partitions by the
//! PARTITION BY key and each partition is stably sorted by the window's
//! ORDER BY. Rows with equal ORDER BY keys are peers.
//!
//! | Function | Value at sorted position `i` |
//! |----------|------------------------------|
//! | `ROW_NUMBER()` | `i + 1` |
//! | `RANK()` | 1 + position of the first peer |
//! | `DENSE_RANK()` | number of distinct peer groups up to `i` |
//! | `LAG(x, n, d)` / `LEAD(x, n, d)` | `x` at `i - n` / `i + n`, else `d` |
//! | aggregate | aggregate over the frame |
//!
//! Aggregate frames: an explicit `ROWS BETWEEN` frame is used as given.
//! Otherwise the frame runs from the partition start to the current row's
//! last peer when the window is ordered, and covers the whole partition
//! when it is not.

use eyre::Result;
use hashbrown::HashMap;

use super::aggregate::Accumulator;
use super::sort::{compare_keys, sort_key_values};
use super::{drain, eval, ExecContext, Executor, Tuple};
use crate::sql::planner::{frame_range, AggregateFunc, WindowExpr, WindowFunc};
use crate::types::Value;

pub struct WindowExec<'p> {
    input: Box<dyn Executor + 'p>,
    functions: &'p [WindowExpr],
    output: std::vec::IntoIter<Tuple>,
}

impl<'p> WindowExec<'p> {
    pub fn new(input: Box<dyn Executor + 'p>, functions: &'p [WindowExpr]) -> Self {
        Self {
            input,
            functions,
            output: Vec::new().into_iter(),
        }
    }
}

impl Executor for WindowExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let rows = drain(self.input.as_mut(), ctx)?;
        let mut columns = Vec::with_capacity(self.functions.len());
        for function in self.functions {
            columns.push(evaluate_window(function, &rows, ctx)?);
        }
        let output: Vec<Tuple> = rows
            .into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                row.extend(columns.iter().map(|c| c[i].clone()));
                row
            })
            .collect();
        self.output = output.into_iter();
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        Ok(self.output.next())
    }
}

/// Computes one window function for every input row, in input order.
fn evaluate_window(window: &WindowExpr, rows: &[Tuple], ctx: &ExecContext<'_>) -> Result<Vec<Value>> {
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<Vec<Value>, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let mut key = Vec::with_capacity(window.partition_by.len());
        for expr in &window.partition_by {
            key.push(eval(expr, row, ctx)?);
        }
        let slot = *by_key.entry(key).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(i);
    }

    let mut out = vec![Value::Null; rows.len()];
    for members in partitions {
        let mut keyed = Vec::with_capacity(members.len());
        for i in members {
            keyed.push((sort_key_values(&window.order_by, &rows[i], ctx)?, i));
        }
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, &window.order_by));
        let order_keys: Vec<&[Value]> = keyed.iter().map(|(k, _)| k.as_slice()).collect();
        let sorted: Vec<usize> = keyed.iter().map(|(_, i)| *i).collect();
        let values = evaluate_partition(window, &sorted, &order_keys, rows, ctx)?;
        for (i, value) in sorted.into_iter().zip(values) {
            out[i] = value;
        }
    }
    Ok(out)
}

fn evaluate_partition(
    window: &WindowExpr,
    sorted: &[usize],
    order_keys: &[&[Value]],
    rows: &[Tuple],
    ctx: &ExecContext<'_>,
) -> Result<Vec<Value>> {
    let len = sorted.len();
    let peers = |a: usize, b: usize| compare_keys(order_keys[a], order_keys[b], &window.order_by).is_eq();
    let mut values = Vec::with_capacity(len);

    match window.func {
        WindowFunc::RowNumber => {
            values.extend((1..=len as i64).map(Value::Integer));
        }
        WindowFunc::Rank | WindowFunc::DenseRank => {
            let (mut rank, mut dense) = (0i64, 0i64);
            for pos in 0..len {
                if pos == 0 || !peers(pos - 1, pos) {
                    rank = pos as i64 + 1;
                    dense += 1;
                }
                let value = if window.func == WindowFunc::Rank { rank } else { dense };
                values.push(Value::Integer(value));
            }
        }
        WindowFunc::Lag | WindowFunc::Lead => {
            for pos in 0..len {
                let row = &rows[sorted[pos]];
                let offset = match window.args.get(1) {
                    Some(expr) => match eval(expr, row, ctx)? {
                        Value::Integer(n) if n >= 0 => n as usize,
                        other => type_bail!("window offset must be a non-negative integer, found {}", other),
                    },
                    None => 1,
                };
                let target = if window.func == WindowFunc::Lag {
                    pos.checked_sub(offset)
                } else {
                    pos.checked_add(offset).filter(|&t| t < len)
                };
                let value = match target {
                    Some(t) => eval(&window.args[0], &rows[sorted[t]], ctx)?,
                    None => match window.args.get(2) {
                        Some(default) => eval(default, row, ctx)?,
                        None => Value::Null,
                    },
                };
                values.push(value);
            }
        }
        WindowFunc::Aggregate(func) => {
            let inputs = aggregate_inputs(window, func, sorted, rows, ctx)?;
            for pos in 0..len {
                let range = match &window.frame {
                    Some(frame) => frame_range(frame, pos, len),
                    None if window.order_by.is_empty() => Some((0, len - 1)),
                    None => {
                        let mut end = pos;
                        while end + 1 < len && peers(pos, end + 1) {
                            end += 1;
                        }
                        Some((0, end))
                    }
                };
                let mut acc = Accumulator::new(func);
                if let Some((start, end)) = range {
                    for value in &inputs[start..=end] {
                        if func == AggregateFunc::CountStar || !value.is_null() {
                            acc.update(value)?;
                        }
                    }
                }
                values.push(acc.finish());
            }
        }
    }
    Ok(values)
}

/// Evaluates the aggregate argument once per row of the sorted partition.
fn aggregate_inputs(
    window: &WindowExpr,
    func: AggregateFunc,
    sorted: &[usize],
    rows: &[Tuple],
    ctx: &ExecContext<'_>,
) -> Result<Vec<Value>> {
    let Some(arg) = window.args.first().filter(|_| func != AggregateFunc::CountStar) else {
        return Ok(vec![Value::Null; sorted.len()]);
    };
    sorted.iter().map(|&i| eval(arg, &rows[i], ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::params::BoundParams;
    use crate::mvcc::WriteSet;
    use crate::sql::ast::{FrameBound, WindowFrame};
    use crate::sql::executor::scan::ValuesExec;
    use crate::sql::planner::{PhysExpr, SortKey};
    use crate::storage::Store;
    use parking_lot::RwLock;

    fn input(rows: &[(i64, i64)]) -> Vec<Vec<PhysExpr>> {
        rows.iter()
            .map(|(g, v)| {
                vec![
                    PhysExpr::Literal(Value::Integer(*g)),
                    PhysExpr::Literal(Value::Integer(*v)),
                ]
            })
            .collect()
    }

    fn window(func: WindowFunc, args: Vec<PhysExpr>, frame: Option<WindowFrame>) -> WindowExpr {
        WindowExpr {
            func,
            args,
            partition_by: vec![PhysExpr::Column(0)],
            order_by: vec![SortKey {
                expr: PhysExpr::Column(1),
                desc: false,
                nulls_first: None,
            }],
            frame,
        }
    }

    fn run(rows: &[Vec<PhysExpr>], functions: &[WindowExpr]) -> Vec<Tuple> {
        let store = RwLock::new(Store::new());
        let writes = WriteSet::new();
        let params = BoundParams::default();
        let ctx = ExecContext::new(&store, 0, &writes, &params);
        let mut exec = WindowExec::new(Box::new(ValuesExec::new(rows)), functions);
        drain(&mut exec, &ctx).unwrap()
    }

    fn column(rows: &[Tuple], i: usize) -> Vec<Value> {
        rows.iter().map(|r| r[i].clone()).collect()
    }

    #[test]
    fn ranking_within_partitions_keeps_input_order() {
        let rows = input(&[(1, 20), (1, 10), (2, 5), (1, 20)]);
        let functions = [
            window(WindowFunc::RowNumber, vec![], None),
            window(WindowFunc::Rank, vec![], None),
            window(WindowFunc::DenseRank, vec![], None),
        ];
        let out = run(&rows, &functions);
        assert_eq!(column(&out, 1), vec![Value::Integer(20), Value::Integer(10), Value::Integer(5), Value::Integer(20)]);
        assert_eq!(column(&out, 2), vec![Value::Integer(2), Value::Integer(1), Value::Integer(1), Value::Integer(3)]);
        assert_eq!(column(&out, 3), vec![Value::Integer(2), Value::Integer(1), Value::Integer(1), Value::Integer(2)]);
        assert_eq!(column(&out, 4), vec![Value::Integer(2), Value::Integer(1), Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn running_sum_includes_peers() {
        let rows = input(&[(1, 1), (1, 2), (1, 2), (1, 3)]);
        let functions = [window(
            WindowFunc::Aggregate(AggregateFunc::Sum),
            vec![PhysExpr::Column(1)],
            None,
        )];
        let out = run(&rows, &functions);
        assert_eq!(
            column(&out, 2),
            vec![Value::Integer(1), Value::Integer(5), Value::Integer(5), Value::Integer(8)]
        );
    }

    #[test]
    fn sliding_frame_average() {
        let rows = input(&[(1, 1), (1, 2), (1, 3), (1, 4)]);
        let frame = WindowFrame {
            start: FrameBound::Preceding(1),
            end: FrameBound::CurrentRow,
        };
        let functions = [window(
            WindowFunc::Aggregate(AggregateFunc::Avg),
            vec![PhysExpr::Column(1)],
            Some(frame),
        )];
        let out = run(&rows, &functions);
        assert_eq!(
            column(&out, 2),
            vec![Value::Float(1.0), Value::Float(1.5), Value::Float(2.5), Value::Float(3.5)]
        );
    }

    #[test]
    fn lag_and_lead_with_default() {
        let rows = input(&[(1, 1), (1, 2), (1, 3)]);
        let functions = [
            window(WindowFunc::Lag, vec![PhysExpr::Column(1)], None),
            window(
                WindowFunc::Lead,
                vec![
                    PhysExpr::Column(1),
                    PhysExpr::Literal(Value::Integer(2)),
                    PhysExpr::Literal(Value::Integer(0)),
                ],
                None,
            ),
        ];
        let out = run(&rows, &functions);
        assert_eq!(column(&out, 2), vec![Value::Null, Value::Integer(1), Value::Integer(2)]);
        assert_eq!(column(&out, 3), vec![Value::Integer(3), Value::Integer(0), Value::Integer(0)]);
    }
}
