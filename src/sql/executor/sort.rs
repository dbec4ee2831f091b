//! Sort, Distinct, Limit and Union.
//!
//! Sorting is stable and uses the total order of `Value::sort_cmp`. NULLs
//! sort first in ascending order and last in descending order unless the
//! key says `NULLS FIRST` / `NULLS LAST`.

use eyre::Result;
use hashbrown::HashSet;
use std::cmp::Ordering;

use super::scan::count_operand;
use super::{drain, eval, ExecContext, Executor, Tuple};
use crate::sql::planner::{PhysExpr, SortKey};
use crate::types::Value;

pub(crate) fn compare_value(a: &Value, b: &Value, key: &SortKey) -> Ordering {
    let nulls_first = key.nulls_first.unwrap_or(!key.desc);
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if key.desc => b.sort_cmp(a),
        (false, false) => a.sort_cmp(b),
    }
}

/// Compares two rows of evaluated sort keys.
pub(crate) fn compare_keys(a: &[Value], b: &[Value], keys: &[SortKey]) -> Ordering {
    a.iter()
        .zip(b)
        .zip(keys)
        .map(|((a, b), key)| compare_value(a, b, key))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

pub(crate) fn sort_key_values(keys: &[SortKey], row: &[Value], ctx: &ExecContext<'_>) -> Result<Vec<Value>> {
    keys.iter().map(|key| eval(&key.expr, row, ctx)).collect()
}

pub struct SortExec<'p> {
    input: Box<dyn Executor + 'p>,
    keys: &'p [SortKey],
    output: std::vec::IntoIter<Tuple>,
}

impl<'p> SortExec<'p> {
    pub fn new(input: Box<dyn Executor + 'p>, keys: &'p [SortKey]) -> Self {
        Self {
            input,
            keys,
            output: Vec::new().into_iter(),
        }
    }
}

impl Executor for SortExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let rows = drain(self.input.as_mut(), ctx)?;
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            keyed.push((sort_key_values(self.keys, &row, ctx)?, row));
        }
        keyed.sort_by(|a, b| compare_keys(&a.0, &b.0, self.keys));
        let rows: Vec<Tuple> = keyed.into_iter().map(|(_, row)| row).collect();
        self.output = rows.into_iter();
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        Ok(self.output.next())
    }
}

pub struct DistinctExec<'p> {
    input: Box<dyn Executor + 'p>,
    seen: HashSet<Tuple>,
}

impl<'p> DistinctExec<'p> {
    pub fn new(input: Box<dyn Executor + 'p>) -> Self {
        Self {
            input,
            seen: HashSet::new(),
        }
    }
}

impl Executor for DistinctExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.seen.clear();
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        while let Some(row) = self.input.next(ctx)? {
            if self.seen.insert(row.clone()) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

pub struct LimitExec<'p> {
    input: Box<dyn Executor + 'p>,
    limit: Option<&'p PhysExpr>,
    offset: Option<&'p PhysExpr>,
    remaining: Option<usize>,
}

impl<'p> LimitExec<'p> {
    pub fn new(
        input: Box<dyn Executor + 'p>,
        limit: Option<&'p PhysExpr>,
        offset: Option<&'p PhysExpr>,
    ) -> Self {
        Self {
            input,
            limit,
            offset,
            remaining: None,
        }
    }
}

impl Executor for LimitExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.remaining = self
            .limit
            .map(|e| count_operand(e, ctx, "LIMIT"))
            .transpose()?;
        let offset = match self.offset {
            Some(e) => count_operand(e, ctx, "OFFSET")?,
            None => 0,
        };
        self.input.open(ctx)?;
        if self.remaining == Some(0) {
            return Ok(());
        }
        for _ in 0..offset {
            if self.input.next(ctx)?.is_none() {
                break;
            }
        }
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        match &mut self.remaining {
            Some(0) => Ok(None),
            Some(n) => {
                *n -= 1;
                self.input.next(ctx)
            }
            None => self.input.next(ctx),
        }
    }
}

pub struct UnionExec<'p> {
    left: Box<dyn Executor + 'p>,
    right: Box<dyn Executor + 'p>,
    all: bool,
    on_right: bool,
    seen: HashSet<Tuple>,
}

impl<'p> UnionExec<'p> {
    pub fn new(left: Box<dyn Executor + 'p>, right: Box<dyn Executor + 'p>, all: bool) -> Self {
        Self {
            left,
            right,
            all,
            on_right: false,
            seen: HashSet::new(),
        }
    }
}

impl Executor for UnionExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.on_right = false;
        self.seen.clear();
        self.left.open(ctx)?;
        self.right.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        loop {
            let row = if self.on_right {
                match self.right.next(ctx)? {
                    Some(row) => row,
                    None => return Ok(None),
                }
            } else {
                match self.left.next(ctx)? {
                    Some(row) => row,
                    None => {
                        self.on_right = true;
                        continue;
                    }
                }
            };
            if self.all || self.seen.insert(row.clone()) {
                return Ok(Some(row));
            }
        }
    }
}
