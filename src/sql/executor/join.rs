//! # Join Operators
//!
//! | Operator | Right side | Match test |
//! |----------|------------|------------|
//! | `NestedLoopJoinExec` | materialized once | ON clause per pair |
//! | `HashJoinExec` | hashed on its equi-join keys | key equality, then residual |
//! | `IndexNestedLoopJoinExec` | ordered index probe per left row | full ON clause |
//!
//! All three stream the left input and emit `left ++ right`. For LEFT
//! joins a left row without matches is emitted once, padded with
//! `right_width` NULLs. A NULL join key never matches.

use eyre::Result;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::collections::VecDeque;

use super::scan::{key_value, scan_table, table_store, table_tuple, visible_row};
use super::{drain, eval, eval_predicate, ExecContext, Executor, Tuple};
use crate::encoding::key::encode_key;
use crate::error::DbError;
use crate::index::{KeyRange, TableIndex};
use crate::schema::TableDef;
use crate::sql::ast::JoinKind;
use crate::sql::planner::PhysExpr;
use crate::types::{DataType, Value};

fn joined(left: &[Value], right: &[Value]) -> Tuple {
    let mut row = Vec::with_capacity(left.len() + right.len());
    row.extend_from_slice(left);
    row.extend_from_slice(right);
    row
}

fn padded(left: &[Value], right_width: usize) -> Tuple {
    let mut row = Vec::with_capacity(left.len() + right_width);
    row.extend_from_slice(left);
    row.resize(left.len() + right_width, Value::Null);
    row
}

/// Output rows produced for the current left row.
#[derive(Default)]
struct Pending {
    rows: VecDeque<Tuple>,
}

impl Pending {
    /// Queues the matches of one left row, or the NULL-padded row for an
    /// unmatched LEFT join.
    fn fill(&mut self, left: &[Value], matches: Vec<Tuple>, kind: JoinKind, right_width: usize) {
        if matches.is_empty() {
            if kind == JoinKind::Left {
                self.rows.push_back(padded(left, right_width));
            }
        } else {
            self.rows.extend(matches);
        }
    }
}

pub struct NestedLoopJoinExec<'p> {
    left: Box<dyn Executor + 'p>,
    right: Box<dyn Executor + 'p>,
    kind: JoinKind,
    condition: Option<&'p PhysExpr>,
    right_width: usize,
    right_rows: Vec<Tuple>,
    pending: Pending,
}

impl<'p> NestedLoopJoinExec<'p> {
    pub fn new(
        left: Box<dyn Executor + 'p>,
        right: Box<dyn Executor + 'p>,
        kind: JoinKind,
        condition: Option<&'p PhysExpr>,
        right_width: usize,
    ) -> Self {
        Self {
            left,
            right,
            kind,
            condition,
            right_width,
            right_rows: Vec::new(),
            pending: Pending::default(),
        }
    }
}

impl Executor for NestedLoopJoinExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.right_rows = drain(self.right.as_mut(), ctx)?;
        self.pending = Pending::default();
        self.left.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        loop {
            if let Some(row) = self.pending.rows.pop_front() {
                return Ok(Some(row));
            }
            let Some(left) = self.left.next(ctx)? else {
                return Ok(None);
            };
            let mut matches = Vec::new();
            for right in &self.right_rows {
                let row = joined(&left, right);
                let keep = match self.condition {
                    Some(condition) => eval_predicate(condition, &row, ctx)?,
                    None => true,
                };
                if keep {
                    matches.push(row);
                }
            }
            self.pending.fill(&left, matches, self.kind, self.right_width);
        }
    }
}

type JoinKey = SmallVec<[Value; 2]>;

/// Evaluates join keys; `None` when any key is NULL.
fn join_key(exprs: &[PhysExpr], row: &[Value], ctx: &ExecContext<'_>) -> Result<Option<JoinKey>> {
    let mut key = JoinKey::with_capacity(exprs.len());
    for expr in exprs {
        let value = eval(expr, row, ctx)?;
        if value.is_null() {
            return Ok(None);
        }
        key.push(value);
    }
    Ok(Some(key))
}

pub struct HashJoinExec<'p> {
    left: Box<dyn Executor + 'p>,
    right: Box<dyn Executor + 'p>,
    kind: JoinKind,
    left_keys: &'p [PhysExpr],
    right_keys: &'p [PhysExpr],
    residual: Option<&'p PhysExpr>,
    right_width: usize,
    right_rows: Vec<Tuple>,
    table: HashMap<JoinKey, Vec<usize>>,
    pending: Pending,
}

impl<'p> HashJoinExec<'p> {
    pub fn new(
        left: Box<dyn Executor + 'p>,
        right: Box<dyn Executor + 'p>,
        kind: JoinKind,
        left_keys: &'p [PhysExpr],
        right_keys: &'p [PhysExpr],
        residual: Option<&'p PhysExpr>,
        right_width: usize,
    ) -> Self {
        Self {
            left,
            right,
            kind,
            left_keys,
            right_keys,
            residual,
            right_width,
            right_rows: Vec::new(),
            table: HashMap::new(),
            pending: Pending::default(),
        }
    }
}

impl Executor for HashJoinExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.right_rows = drain(self.right.as_mut(), ctx)?;
        self.table.clear();
        for (position, row) in self.right_rows.iter().enumerate() {
            if let Some(key) = join_key(self.right_keys, row, ctx)? {
                self.table.entry(key).or_default().push(position);
            }
        }
        self.pending = Pending::default();
        self.left.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        loop {
            if let Some(row) = self.pending.rows.pop_front() {
                return Ok(Some(row));
            }
            let Some(left) = self.left.next(ctx)? else {
                return Ok(None);
            };
            let mut matches = Vec::new();
            let bucket = match join_key(self.left_keys, &left, ctx)? {
                Some(key) => self.table.get(&key),
                None => None,
            };
            for &position in bucket.into_iter().flatten() {
                let row = joined(&left, &self.right_rows[position]);
                let keep = match self.residual {
                    Some(residual) => eval_predicate(residual, &row, ctx)?,
                    None => true,
                };
                if keep {
                    matches.push(row);
                }
            }
            self.pending.fill(&left, matches, self.kind, self.right_width);
        }
    }
}

pub struct IndexNestedLoopJoinExec<'p> {
    left: Box<dyn Executor + 'p>,
    table: &'p TableDef,
    index: &'p str,
    keys: &'p [PhysExpr],
    key_types: &'p [DataType],
    kind: JoinKind,
    condition: Option<&'p PhysExpr>,
    /// Every visible right row, loaded when a probe key cannot be
    /// expressed in the index's key space.
    all_rows: Option<Vec<Tuple>>,
    pending: Pending,
}

impl<'p> IndexNestedLoopJoinExec<'p> {
    pub fn new(
        left: Box<dyn Executor + 'p>,
        table: &'p TableDef,
        index: &'p str,
        keys: &'p [PhysExpr],
        key_types: &'p [DataType],
        kind: JoinKind,
        condition: Option<&'p PhysExpr>,
    ) -> Self {
        Self {
            left,
            table,
            index,
            keys,
            key_types,
            kind,
            condition,
            all_rows: None,
            pending: Pending::default(),
        }
    }

    fn right_width(&self) -> usize {
        self.table.column_count() + 1
    }

    /// Right rows whose index key may equal the probe.
    fn candidates(&mut self, left: &[Value], ctx: &ExecContext<'_>) -> Result<Vec<Tuple>> {
        let mut probe: SmallVec<[Value; 4]> = SmallVec::new();
        let mut exact = true;
        for (expr, data_type) in self.keys.iter().zip(self.key_types) {
            let value = eval(expr, left, ctx)?;
            if value.is_null() {
                return Ok(Vec::new());
            }
            match key_value(value, *data_type) {
                Some(v) => probe.push(v),
                None => exact = false,
            }
        }

        if !exact {
            if self.all_rows.is_none() {
                let rows = scan_table(ctx, self.table)?
                    .into_iter()
                    .map(|(id, data)| table_tuple(id, &data))
                    .collect();
                self.all_rows = Some(rows);
            }
            return Ok(self.all_rows.clone().unwrap_or_default());
        }

        let store = ctx.store.read();
        let table_store = table_store(&store, self.table)?;
        let index = table_store
            .index(self.index)
            .and_then(TableIndex::as_ordered)
            .ok_or_else(|| DbError::schema(format!("index '{}' no longer exists", self.index)))?;
        let mut ids = index.scan(&KeyRange::prefix(encode_key(&probe)));
        if let Some(pending) = ctx.writes.table(self.table.id()) {
            ids.extend(pending.keys().copied());
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids
            .into_iter()
            .filter_map(|id| visible_row(ctx, table_store, id).map(|data| table_tuple(id, &data)))
            .collect())
    }
}

impl Executor for IndexNestedLoopJoinExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.all_rows = None;
        self.pending = Pending::default();
        self.left.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        loop {
            if let Some(row) = self.pending.rows.pop_front() {
                return Ok(Some(row));
            }
            let Some(left) = self.left.next(ctx)? else {
                return Ok(None);
            };
            let mut matches = Vec::new();
            for right in self.candidates(&left, ctx)? {
                let row = joined(&left, &right);
                let keep = match self.condition {
                    Some(condition) => eval_predicate(condition, &row, ctx)?,
                    None => true,
                };
                if keep {
                    matches.push(row);
                }
            }
            let width = self.right_width();
            self.pending.fill(&left, matches, self.kind, width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::params::BoundParams;
    use crate::mvcc::WriteSet;
    use crate::sql::ast::BinaryOp;
    use crate::sql::executor::scan::ValuesExec;
    use crate::storage::Store;
    use parking_lot::RwLock;

    fn values(rows: &[&[i64]]) -> Vec<Vec<PhysExpr>> {
        rows.iter()
            .map(|r| r.iter().map(|v| PhysExpr::Literal(Value::Integer(*v))).collect())
            .collect()
    }

    fn run(executor: &mut dyn Executor) -> Vec<Tuple> {
        let store = RwLock::new(Store::new());
        let writes = WriteSet::new();
        let params = BoundParams::default();
        let ctx = ExecContext::new(&store, 0, &writes, &params);
        drain(executor, &ctx).unwrap()
    }

    #[test]
    fn left_hash_join_pads_unmatched_rows() {
        let left = values(&[&[1], &[2], &[3]]);
        let right = values(&[&[1, 10], &[1, 11], &[3, 30]]);
        let left_keys = vec![PhysExpr::Column(0)];
        let right_keys = vec![PhysExpr::Column(0)];
        let mut join = HashJoinExec::new(
            Box::new(ValuesExec::new(&left)),
            Box::new(ValuesExec::new(&right)),
            JoinKind::Left,
            &left_keys,
            &right_keys,
            None,
            2,
        );
        let rows = run(&mut join);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], vec![Value::Integer(2), Value::Null, Value::Null]);
        assert_eq!(rows[3][2], Value::Integer(30));
    }

    #[test]
    fn null_keys_never_match() {
        let left = vec![vec![PhysExpr::Literal(Value::Null)]];
        let right = vec![vec![PhysExpr::Literal(Value::Null)]];
        let keys = vec![PhysExpr::Column(0)];
        let mut join = HashJoinExec::new(
            Box::new(ValuesExec::new(&left)),
            Box::new(ValuesExec::new(&right)),
            JoinKind::Inner,
            &keys,
            &keys,
            None,
            1,
        );
        assert!(run(&mut join).is_empty());
    }

    #[test]
    fn nested_loop_join_applies_condition() {
        let left = values(&[&[1], &[5]]);
        let right = values(&[&[2], &[4], &[6]]);
        let condition = PhysExpr::Binary {
            op: BinaryOp::Lt,
            left: Box::new(PhysExpr::Column(0)),
            right: Box::new(PhysExpr::Column(1)),
        };
        let mut join = NestedLoopJoinExec::new(
            Box::new(ValuesExec::new(&left)),
            Box::new(ValuesExec::new(&right)),
            JoinKind::Inner,
            Some(&condition),
            1,
        );
        let rows = run(&mut join);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3], vec![Value::Integer(5), Value::Integer(6)]);
    }
}
