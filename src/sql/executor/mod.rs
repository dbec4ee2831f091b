//! # Query Executor - Volcano Model Implementation
//!
//! Pull-based evaluation of a `PhysicalPlan`. Each physical operator becomes
//! an `Executor`:
//!
//! - `open()`: prepare state; blocking operators consume their input here
//! - `next()`: produce the next tuple, `None` when exhausted
//!
//! ```text
//! ProjectExec
//!     └── FilterExec
//!             └── SeqScanExec
//!                     └── [visible rows ⊕ write-set overlay]
//! ```
//!
//! ## Tuples
//!
//! A tuple is a `Vec<Value>` laid out as the planner's scope describes it.
//! Base table scans emit the table columns followed by the row id.
//!
//! ## Execution Context
//!
//! `ExecContext` carries everything an operator reads besides its input:
//!
//! - the store, read under a short `RwLock` read guard while a scan
//!   materializes its candidate rows
//! - the snapshot timestamp and the transaction's own `WriteSet`, which
//!   together decide visibility
//! - bound parameter values
//! - the stack of outer rows for correlated subqueries
//! - per-statement caches for uncorrelated subqueries and CTEs
//!
//! The context is single-threaded (`RefCell`), one per statement execution.
//!
//! ## Module Structure
//!
//! - `eval`: expression evaluation with three-valued logic
//! - `scan`: Values, SeqScan, IndexScan, VectorSearch, CteScan
//! - `join`: nested loop, hash and index nested loop joins
//! - `aggregate`: hash aggregation
//! - `window`: window functions
//! - `sort`: Sort, Distinct, Limit, Union
//! - `dml`: INSERT/UPDATE/DELETE against the write set

pub mod aggregate;
pub mod dml;
pub mod eval;
pub mod join;
pub mod scan;
pub mod sort;
pub mod window;

pub use dml::{execute_delete, execute_insert, execute_update};
pub use eval::{eval, eval_predicate};

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::rc::Rc;

use crate::database::params::BoundParams;
use crate::mvcc::WriteSet;
use crate::sql::planner::{PhysExpr, PhysicalPlan};
use crate::storage::Store;
use crate::types::{CommitTs, Value};

pub type Tuple = Vec<Value>;

pub trait Executor {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()>;
    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>>;
}

pub struct ExecContext<'a> {
    pub store: &'a RwLock<Store>,
    pub read_ts: CommitTs,
    pub writes: &'a WriteSet,
    pub params: &'a BoundParams,
    outer: RefCell<Vec<Tuple>>,
    subquery_cache: RefCell<HashMap<usize, Rc<Vec<Tuple>>>>,
    cte_cache: RefCell<HashMap<usize, Rc<Vec<Tuple>>>>,
}

impl<'a> ExecContext<'a> {
    pub fn new(
        store: &'a RwLock<Store>,
        read_ts: CommitTs,
        writes: &'a WriteSet,
        params: &'a BoundParams,
    ) -> Self {
        Self {
            store,
            read_ts,
            writes,
            params,
            outer: RefCell::new(Vec::new()),
            subquery_cache: RefCell::new(HashMap::new()),
            cte_cache: RefCell::new(HashMap::new()),
        }
    }

    /// Value of an enclosing query's column; level 1 is the innermost.
    pub fn outer_value(&self, level: usize, index: usize) -> Result<Value> {
        let outer = self.outer.borrow();
        match outer.len().checked_sub(level).and_then(|i| outer.get(i)) {
            Some(row) => Ok(row.get(index).cloned().unwrap_or(Value::Null)),
            None => Err(eyre::eyre!(
                "outer reference at level {} evaluated without an enclosing row",
                level
            )),
        }
    }

    /// Runs `f` with `row` pushed as the innermost outer row.
    pub fn with_outer<T>(&self, row: &[Value], f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.outer.borrow_mut().push(row.to_vec());
        let result = f();
        self.outer.borrow_mut().pop();
        result
    }

    pub(crate) fn cached_subquery(&self, id: usize) -> Option<Rc<Vec<Tuple>>> {
        self.subquery_cache.borrow().get(&id).cloned()
    }

    pub(crate) fn cache_subquery(&self, id: usize, rows: Rc<Vec<Tuple>>) {
        self.subquery_cache.borrow_mut().insert(id, rows);
    }

    pub(crate) fn cached_cte(&self, id: usize) -> Option<Rc<Vec<Tuple>>> {
        self.cte_cache.borrow().get(&id).cloned()
    }

    pub(crate) fn cache_cte(&self, id: usize, rows: Rc<Vec<Tuple>>) {
        self.cte_cache.borrow_mut().insert(id, rows);
    }
}

/// Builds the executor tree for `plan`.
pub fn build(plan: &PhysicalPlan) -> Box<dyn Executor + '_> {
    match plan {
        PhysicalPlan::Values { rows } => Box::new(scan::ValuesExec::new(rows)),
        PhysicalPlan::SeqScan { table, filter, .. } => {
            Box::new(scan::SeqScanExec::new(table, filter.as_ref()))
        }
        PhysicalPlan::IndexScan {
            table,
            index,
            access,
            filter,
            ..
        } => Box::new(scan::IndexScanExec::new(table, index, access, filter.as_ref())),
        PhysicalPlan::VectorSearch {
            table,
            index,
            query,
            limit,
            offset,
            ef_search,
            ..
        } => Box::new(scan::VectorSearchExec::new(
            table,
            index,
            query,
            limit,
            offset.as_ref(),
            *ef_search,
        )),
        PhysicalPlan::CteScan {
            id,
            plan,
            correlated,
            ..
        } => Box::new(scan::CteScanExec::new(*id, plan, *correlated)),
        PhysicalPlan::Filter { input, predicate } => Box::new(FilterExec {
            input: build(input),
            predicate,
        }),
        PhysicalPlan::Project { input, exprs } => Box::new(ProjectExec {
            input: build(input),
            exprs,
        }),
        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            kind,
            condition,
            right_width,
        } => Box::new(join::NestedLoopJoinExec::new(
            build(left),
            build(right),
            *kind,
            condition.as_ref(),
            *right_width,
        )),
        PhysicalPlan::HashJoin {
            left,
            right,
            kind,
            left_keys,
            right_keys,
            residual,
            right_width,
        } => Box::new(join::HashJoinExec::new(
            build(left),
            build(right),
            *kind,
            left_keys,
            right_keys,
            residual.as_ref(),
            *right_width,
        )),
        PhysicalPlan::IndexNestedLoopJoin {
            left,
            table,
            index,
            keys,
            key_types,
            kind,
            condition,
            ..
        } => Box::new(join::IndexNestedLoopJoinExec::new(
            build(left),
            table,
            index,
            keys,
            key_types,
            *kind,
            condition.as_ref(),
        )),
        PhysicalPlan::Aggregate {
            input,
            group_by,
            aggregates,
        } => Box::new(aggregate::HashAggregateExec::new(build(input), group_by, aggregates)),
        PhysicalPlan::Window { input, functions } => {
            Box::new(window::WindowExec::new(build(input), functions))
        }
        PhysicalPlan::Sort { input, keys } => Box::new(sort::SortExec::new(build(input), keys)),
        PhysicalPlan::Distinct { input } => Box::new(sort::DistinctExec::new(build(input))),
        PhysicalPlan::Limit {
            input,
            limit,
            offset,
        } => Box::new(sort::LimitExec::new(build(input), limit.as_ref(), offset.as_ref())),
        PhysicalPlan::Union { left, right, all } => {
            Box::new(sort::UnionExec::new(build(left), build(right), *all))
        }
    }
}

/// Runs a plan to completion.
pub fn collect(plan: &PhysicalPlan, ctx: &ExecContext<'_>) -> Result<Vec<Tuple>> {
    let mut executor = build(plan);
    executor.open(ctx)?;
    let mut rows = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        rows.push(row);
    }
    Ok(rows)
}

pub fn drain(executor: &mut dyn Executor, ctx: &ExecContext<'_>) -> Result<Vec<Tuple>> {
    executor.open(ctx)?;
    let mut rows = Vec::new();
    while let Some(row) = executor.next(ctx)? {
        rows.push(row);
    }
    Ok(rows)
}

pub struct FilterExec<'p> {
    input: Box<dyn Executor + 'p>,
    predicate: &'p PhysExpr,
}

impl Executor for FilterExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        while let Some(row) = self.input.next(ctx)? {
            if eval_predicate(self.predicate, &row, ctx)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }
}

pub struct ProjectExec<'p> {
    input: Box<dyn Executor + 'p>,
    exprs: &'p [PhysExpr],
}

impl Executor for ProjectExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.input.open(ctx)
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        let Some(row) = self.input.next(ctx)? else {
            return Ok(None);
        };
        let mut out = Vec::with_capacity(self.exprs.len());
        for expr in self.exprs {
            out.push(eval(expr, &row, ctx)?);
        }
        Ok(Some(out))
    }
}
