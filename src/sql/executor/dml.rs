//! # Write Statements
//!
//! INSERT, UPDATE and DELETE run in two phases:
//!
//! 1. **Collect**: the source (VALUES, a query, or the target scan) is run
//!    to completion against the snapshot plus the transaction's earlier
//!    writes. Assignment expressions are evaluated here, against the old
//!    row image.
//! 2. **Stage**: each new image is completed with defaults, coerced to
//!    the column types and checked for NOT NULL and uniqueness, then
//!    staged in the `WriteSet`.
//!
//! A statement is atomic within its transaction: the write set is marked
//! before staging and rolled back to the mark if any row fails.
//!
//! ## Uniqueness
//!
//! A new image is checked against the latest committed rows (seen through
//! the transaction's own writes) and against every image the transaction
//! has staged. The check is repeated at commit, where it also covers rows
//! committed concurrently.

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use super::scan::table_store;
use super::{collect, eval, ExecContext, Tuple};
use crate::database::params::BoundParams;
use crate::error::DbError;
use crate::index::{OrderedIndex, TableIndex};
use crate::mvcc::WriteSet;
use crate::schema::TableDef;
use crate::sql::planner::{DeletePlan, InsertPlan, PhysicalPlan, UpdatePlan};
use crate::storage::table::duplicate_key;
use crate::storage::{Store, TableStore};
use crate::types::{CommitTs, RowId, Value};

/// Everything a write statement reads besides its plan.
#[derive(Clone, Copy)]
pub struct DmlEnv<'a> {
    pub store: &'a RwLock<Store>,
    pub read_ts: CommitTs,
    pub params: &'a BoundParams,
}

impl DmlEnv<'_> {
    fn collect(&self, plan: &PhysicalPlan, writes: &WriteSet) -> Result<Vec<Tuple>> {
        let ctx = ExecContext::new(self.store, self.read_ts, writes, self.params);
        collect(plan, &ctx)
    }
}

pub fn execute_insert(env: DmlEnv<'_>, plan: &InsertPlan, writes: &mut WriteSet) -> Result<u64> {
    let source = env.collect(&plan.source, writes)?;
    let table = &plan.table;

    let mut rows = Vec::with_capacity(source.len());
    for values in source {
        let mut row: Vec<Option<Value>> = vec![None; table.column_count()];
        for (value, &target) in values.into_iter().zip(&plan.targets) {
            row[target] = Some(value);
        }
        let row: Vec<Value> = row
            .into_iter()
            .zip(table.columns())
            .map(|(value, column)| {
                value.unwrap_or_else(|| {
                    column
                        .default_value()
                        .map(|d| d.evaluate())
                        .unwrap_or(Value::Null)
                })
            })
            .collect();
        rows.push(row);
    }

    atomically(writes, |writes| {
        let store = env.store.read();
        let table_store = table_store(&store, table)?;
        let mut keys = StagedKeys::new(table_store, writes);
        for row in rows {
            let row = conform_row(table, row)?;
            let row_id = table_store.allocate_row_id();
            keys.check(table_store, writes, row_id, &row)?;
            keys.record(table_store, row_id, &row);
            writes.insert(table.id(), row_id, row);
        }
        Ok(keys.staged)
    })
}

pub fn execute_update(env: DmlEnv<'_>, plan: &UpdatePlan, writes: &mut WriteSet) -> Result<u64> {
    let table = &plan.table;
    let width = table.column_count();

    let changes: Vec<(RowId, Vec<Value>)> = {
        let ctx = ExecContext::new(env.store, env.read_ts, writes, env.params);
        let tuples = collect(&plan.scan, &ctx)?;
        let mut changes = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let row_id = row_id_of(&tuple, width)?;
            let mut row = tuple[..width].to_vec();
            for (position, expr) in &plan.assignments {
                row[*position] = eval(expr, &tuple, &ctx)?;
            }
            changes.push((row_id, row));
        }
        changes
    };

    atomically(writes, |writes| {
        let store = env.store.read();
        let table_store = table_store(&store, table)?;
        let mut keys = StagedKeys::new(table_store, writes);
        for (row_id, row) in changes {
            let row = conform_row(table, row)?;
            keys.check(table_store, writes, row_id, &row)?;
            keys.record(table_store, row_id, &row);
            writes.update(table.id(), row_id, row);
        }
        Ok(keys.staged)
    })
}

pub fn execute_delete(env: DmlEnv<'_>, plan: &DeletePlan, writes: &mut WriteSet) -> Result<u64> {
    let table = &plan.table;
    let width = table.column_count();
    let tuples = env.collect(&plan.scan, writes)?;
    let row_ids = tuples
        .iter()
        .map(|t| row_id_of(t, width))
        .collect::<Result<Vec<_>>>()?;

    atomically(writes, |writes| {
        for &row_id in &row_ids {
            writes.delete(table.id(), row_id);
        }
        Ok(row_ids.len() as u64)
    })
}

/// Runs `stage`, undoing everything it staged if it fails.
fn atomically(writes: &mut WriteSet, stage: impl FnOnce(&mut WriteSet) -> Result<u64>) -> Result<u64> {
    let savepoint = writes.mark();
    let result = stage(writes);
    if result.is_err() {
        writes.rollback_to(savepoint);
    }
    result
}

fn row_id_of(tuple: &[Value], width: usize) -> Result<RowId> {
    match tuple.get(width) {
        Some(Value::Integer(id)) => Ok(*id as RowId),
        _ => Err(eyre::eyre!("scan tuple is missing its row id")),
    }
}

/// Coerces a full row image to the column types and checks NOT NULL.
fn conform_row(table: &TableDef, row: Vec<Value>) -> Result<Arc<[Value]>> {
    let mut out = Vec::with_capacity(row.len());
    for (value, column) in row.into_iter().zip(table.columns()) {
        let value = column.data_type().coerce(value)?;
        if value.is_null() && !column.is_nullable() {
            return Err(DbError::schema(format!(
                "NOT NULL constraint failed: {}.{}",
                table.name(),
                column.name()
            )));
        }
        out.push(value);
    }
    Ok(out.into())
}

/// Unique keys of the images this transaction has staged for one table.
/// Entries may go stale when a row is restaged; lookups re-check the
/// row's current staged image.
struct StagedKeys {
    keys: HashMap<(usize, Vec<u8>), RowId>,
    staged: u64,
}

impl StagedKeys {
    fn new(table: &TableStore, writes: &WriteSet) -> Self {
        let mut keys = Self {
            keys: HashMap::new(),
            staged: 0,
        };
        if let Some(pending) = writes.table(table.id()) {
            for (row_id, write) in pending {
                if let Some(data) = &write.data {
                    keys.insert(table, *row_id, data);
                }
            }
        }
        keys
    }

    fn unique_indexes(table: &TableStore) -> impl Iterator<Item = (usize, &OrderedIndex)> + '_ {
        table
            .indexes()
            .iter()
            .enumerate()
            .filter_map(|(i, index)| TableIndex::as_ordered(index).map(|o| (i, o)))
            .filter(|(_, index)| index.is_unique())
    }

    fn insert(&mut self, table: &TableStore, row_id: RowId, row: &[Value]) {
        for (position, index) in Self::unique_indexes(table) {
            if !index.key_has_null(row) {
                self.keys.insert((position, index.key_for(row)), row_id);
            }
        }
    }

    fn record(&mut self, table: &TableStore, row_id: RowId, row: &[Value]) {
        self.insert(table, row_id, row);
        self.staged += 1;
    }

    fn check(&self, table: &TableStore, writes: &WriteSet, row_id: RowId, row: &[Value]) -> Result<()> {
        table.check_unique(row_id, row, writes.table(table.id()))?;
        for (position, index) in Self::unique_indexes(table) {
            if index.key_has_null(row) {
                continue;
            }
            let key = index.key_for(row);
            let Some(&other) = self.keys.get(&(position, key.clone())) else {
                continue;
            };
            if other == row_id {
                continue;
            }
            let clash = writes
                .get(table.id(), other)
                .and_then(|w| w.data.as_ref())
                .is_some_and(|data| index.key_for(data) == key);
            if clash {
                return Err(duplicate_key(index.def()));
            }
        }
        Ok(())
    }
}
