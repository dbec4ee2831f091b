//! # Leaf Operators
//!
//! Base table scans read committed versions visible at the statement's
//! snapshot, overlaid with the transaction's own staged writes:
//!
//! ```text
//! committed rows @ read_ts ──┐
//!                            ├── merge by row id ──> [columns..., rowid]
//! write set (this txn) ──────┘   (staged image wins, staged delete hides)
//! ```
//!
//! Every scan materializes its rows in `open()` under a short read guard on
//! the store and evaluates filters afterwards, so subqueries inside a filter
//! never run while the guard is held.
//!
//! ## Index Scans
//!
//! An ordered index holds entries for every committed version still
//! retained, so a lookup may name rows whose visible image no longer
//! matches the key. Candidates are therefore re-read at the snapshot and
//! the full WHERE clause is applied to them. Rows staged by the current
//! transaction are not in any index yet and are always added as candidates.
//!
//! ## Vector Search
//!
//! The HNSW graph is asked for `limit + offset` neighbors. Stale versions
//! are dropped and distances are recomputed from the visible image; while
//! too few visible rows remain and the graph holds more entries, the
//! request is doubled. Staged rows are ranked by brute force. Rows whose
//! vector is NULL come first in row id order, as they would from a sort on
//! the distance.

use eyre::Result;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use super::{collect, eval, eval_predicate, ExecContext, Executor, Tuple};
use crate::encoding::key::encode_key;
use crate::error::DbError;
use crate::index::{KeyRange, TableIndex};
use crate::schema::TableDef;
use crate::sql::planner::{IndexAccess, PhysExpr, PhysicalPlan};
use crate::storage::{Store, TableStore};
use crate::types::{DataType, RowId, Value};

/// Appends the row id to a row image.
pub(crate) fn table_tuple(row_id: RowId, data: &[Value]) -> Tuple {
    let mut tuple = Vec::with_capacity(data.len() + 1);
    tuple.extend_from_slice(data);
    tuple.push(Value::Integer(row_id as i64));
    tuple
}

pub(crate) fn table_store<'s>(store: &'s Store, table: &TableDef) -> Result<&'s TableStore> {
    store.table(table.id()).ok_or_else(|| {
        DbError::schema(format!("table '{}' no longer exists", table.name()))
    })
}

/// The image of one row as this statement sees it.
pub(crate) fn visible_row(
    ctx: &ExecContext<'_>,
    store: &TableStore,
    row_id: RowId,
) -> Option<Arc<[Value]>> {
    match ctx.writes.get(store.id(), row_id) {
        Some(write) => write.data.clone(),
        None => store.visible(row_id, ctx.read_ts).cloned(),
    }
}

/// All rows of `table` visible to this statement, in row id order.
pub(crate) fn scan_table(ctx: &ExecContext<'_>, table: &TableDef) -> Result<Vec<(RowId, Arc<[Value]>)>> {
    let store = ctx.store.read();
    let table_store = table_store(&store, table)?;
    let mut rows: BTreeMap<RowId, Arc<[Value]>> = table_store
        .visible_rows(ctx.read_ts)
        .map(|(id, data)| (id, Arc::clone(data)))
        .collect();
    if let Some(pending) = ctx.writes.table(table.id()) {
        for (row_id, write) in pending {
            match &write.data {
                Some(data) => rows.insert(*row_id, Arc::clone(data)),
                None => rows.remove(row_id),
            };
        }
    }
    Ok(rows.into_iter().collect())
}

/// Converts an index key operand to the column type. `None` means the
/// operand cannot be matched through the index and a full scan is needed.
pub(crate) fn key_value(value: Value, data_type: DataType) -> Option<Value> {
    let compatible = match (value.data_type(), data_type) {
        (None, _) => true,
        (Some(a), b) if a == b => true,
        (Some(a), b) if a.is_numeric() && b.is_numeric() => true,
        (Some(DataType::Text), DataType::Timestamp | DataType::Json) => true,
        _ => false,
    };
    if !compatible {
        return None;
    }
    data_type.coerce(value).ok()
}

/// Rows produced by a leaf, consumed front to back with an optional filter.
struct RowBuffer {
    rows: std::vec::IntoIter<Tuple>,
}

impl RowBuffer {
    fn empty() -> Self {
        Self {
            rows: Vec::new().into_iter(),
        }
    }

    fn new(rows: Vec<Tuple>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    fn next_matching(
        &mut self,
        filter: Option<&PhysExpr>,
        ctx: &ExecContext<'_>,
    ) -> Result<Option<Tuple>> {
        for row in self.rows.by_ref() {
            match filter {
                Some(filter) if !eval_predicate(filter, &row, ctx)? => continue,
                _ => return Ok(Some(row)),
            }
        }
        Ok(None)
    }
}

pub struct ValuesExec<'p> {
    rows: &'p [Vec<PhysExpr>],
    position: usize,
}

impl<'p> ValuesExec<'p> {
    pub fn new(rows: &'p [Vec<PhysExpr>]) -> Self {
        Self { rows, position: 0 }
    }
}

impl Executor for ValuesExec<'_> {
    fn open(&mut self, _ctx: &ExecContext<'_>) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        let Some(exprs) = self.rows.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        let mut row = Vec::with_capacity(exprs.len());
        for expr in exprs {
            row.push(eval(expr, &[], ctx)?);
        }
        Ok(Some(row))
    }
}

pub struct SeqScanExec<'p> {
    table: &'p TableDef,
    filter: Option<&'p PhysExpr>,
    buffer: RowBuffer,
}

impl<'p> SeqScanExec<'p> {
    pub fn new(table: &'p TableDef, filter: Option<&'p PhysExpr>) -> Self {
        Self {
            table,
            filter,
            buffer: RowBuffer::empty(),
        }
    }
}

impl Executor for SeqScanExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let rows = scan_table(ctx, self.table)?
            .into_iter()
            .map(|(id, data)| table_tuple(id, &data))
            .collect();
        self.buffer = RowBuffer::new(rows);
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        self.buffer.next_matching(self.filter, ctx)
    }
}

pub struct IndexScanExec<'p> {
    table: &'p TableDef,
    index: &'p str,
    access: &'p IndexAccess,
    filter: Option<&'p PhysExpr>,
    buffer: RowBuffer,
}

/// How the index bounds resolved for this execution.
enum KeyBounds {
    Range(KeyRange),
    /// A bound is NULL; no row can satisfy it.
    Empty,
    /// A bound cannot be expressed in the index's key space.
    FullScan,
}

impl<'p> IndexScanExec<'p> {
    pub fn new(
        table: &'p TableDef,
        index: &'p str,
        access: &'p IndexAccess,
        filter: Option<&'p PhysExpr>,
    ) -> Self {
        Self {
            table,
            index,
            access,
            filter,
            buffer: RowBuffer::empty(),
        }
    }

    fn bounds(&self, ctx: &ExecContext<'_>) -> Result<KeyBounds> {
        let access = self.access;
        let mut eq: SmallVec<[Value; 4]> = SmallVec::new();
        for (expr, data_type) in access.eq.iter().zip(&access.key_types) {
            let value = eval(expr, &[], ctx)?;
            if value.is_null() {
                return Ok(KeyBounds::Empty);
            }
            match key_value(value, *data_type) {
                Some(v) => eq.push(v),
                None => return Ok(KeyBounds::FullScan),
            }
        }
        let prefix = encode_key(&eq);
        if access.lower.is_none() && access.upper.is_none() {
            return Ok(KeyBounds::Range(KeyRange::prefix(prefix)));
        }

        let Some(&range_type) = access.key_types.get(access.eq.len()) else {
            return Ok(KeyBounds::FullScan);
        };
        let lower = match range_bound(access.lower.as_ref(), range_type, ctx)? {
            Ok(bound) => bound,
            Err(resolved) => return Ok(resolved),
        };
        let upper = match range_bound(access.upper.as_ref(), range_type, ctx)? {
            Ok(bound) => bound,
            Err(resolved) => return Ok(resolved),
        };
        Ok(KeyBounds::Range(KeyRange::on_column(
            &prefix,
            lower.as_ref().map(|(v, inc)| (v, *inc)),
            upper.as_ref().map(|(v, inc)| (v, *inc)),
        )))
    }
}

/// Resolves one side of a range. `Err` short-circuits the whole lookup.
fn range_bound(
    bound: Option<&(PhysExpr, bool)>,
    data_type: DataType,
    ctx: &ExecContext<'_>,
) -> Result<std::result::Result<Option<(Value, bool)>, KeyBounds>> {
    let Some((expr, inclusive)) = bound else {
        return Ok(Ok(None));
    };
    let value = eval(expr, &[], ctx)?;
    if value.is_null() {
        return Ok(Err(KeyBounds::Empty));
    }
    Ok(match key_value(value, data_type) {
        Some(v) => Ok(Some((v, *inclusive))),
        None => Err(KeyBounds::FullScan),
    })
}

impl Executor for IndexScanExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let range = match self.bounds(ctx)? {
            KeyBounds::Range(range) => range,
            KeyBounds::Empty => {
                self.buffer = RowBuffer::empty();
                return Ok(());
            }
            KeyBounds::FullScan => {
                let rows = scan_table(ctx, self.table)?
                    .into_iter()
                    .map(|(id, data)| table_tuple(id, &data))
                    .collect();
                self.buffer = RowBuffer::new(rows);
                return Ok(());
            }
        };

        let store = ctx.store.read();
        let table_store = table_store(&store, self.table)?;
        let index = table_store
            .index(self.index)
            .and_then(TableIndex::as_ordered)
            .ok_or_else(|| DbError::schema(format!("index '{}' no longer exists", self.index)))?;

        let mut candidates = index.scan(&range);
        if let Some(pending) = ctx.writes.table(self.table.id()) {
            candidates.extend(pending.keys().copied());
        }
        candidates.sort_unstable();
        candidates.dedup();

        let rows = candidates
            .into_iter()
            .filter_map(|id| visible_row(ctx, table_store, id).map(|data| table_tuple(id, &data)))
            .collect();
        self.buffer = RowBuffer::new(rows);
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        self.buffer.next_matching(self.filter, ctx)
    }
}

pub struct VectorSearchExec<'p> {
    table: &'p TableDef,
    index: &'p str,
    query: &'p PhysExpr,
    limit: &'p PhysExpr,
    offset: Option<&'p PhysExpr>,
    ef_search: usize,
    buffer: RowBuffer,
}

/// Evaluates a LIMIT or OFFSET operand.
pub(crate) fn count_operand(expr: &PhysExpr, ctx: &ExecContext<'_>, what: &str) -> Result<usize> {
    match eval(expr, &[], ctx)? {
        Value::Integer(n) if n >= 0 => Ok(n as usize),
        Value::Float(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
        other => type_bail!("{} must be a non-negative integer, found {}", what, other),
    }
}

impl<'p> VectorSearchExec<'p> {
    pub fn new(
        table: &'p TableDef,
        index: &'p str,
        query: &'p PhysExpr,
        limit: &'p PhysExpr,
        offset: Option<&'p PhysExpr>,
        ef_search: usize,
    ) -> Self {
        Self {
            table,
            index,
            query,
            limit,
            offset,
            ef_search,
            buffer: RowBuffer::empty(),
        }
    }
}

impl Executor for VectorSearchExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        let limit = count_operand(self.limit, ctx, "LIMIT")?;
        let offset = match self.offset {
            Some(expr) => count_operand(expr, ctx, "OFFSET")?,
            None => 0,
        };
        if limit == 0 {
            self.buffer = RowBuffer::empty();
            return Ok(());
        }
        let query = eval(self.query, &[], ctx)?;
        if query.is_null() {
            // Every distance is NULL, so the sort keeps row id order.
            let rows = scan_table(ctx, self.table)?
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|(id, data)| table_tuple(id, &data))
                .collect();
            self.buffer = RowBuffer::new(rows);
            return Ok(());
        }
        let query = query
            .to_vector()?
            .ok_or_else(|| DbError::type_mismatch("vector search query must be a VECTOR"))?;
        let wanted = limit.saturating_add(offset);

        let store = ctx.store.read();
        let table_store = table_store(&store, self.table)?;
        let Some(TableIndex::Hnsw {
            column,
            graph,
            nulls,
            ..
        }) = table_store.index(self.index)
        else {
            schema_bail!("vector index '{}' no longer exists", self.index);
        };
        if query.len() != graph.dimensions() {
            type_bail!(
                "vector dimension mismatch: expected {}, got {}",
                graph.dimensions(),
                query.len()
            );
        }
        let metric = graph.metric();
        let pending = ctx.writes.table(self.table.id());
        let staged = |row_id: &RowId| pending.is_some_and(|p| p.contains_key(row_id));

        // A NULL distance sorts ahead of every number.
        let mut null_rows: BTreeMap<RowId, Arc<[Value]>> = nulls
            .iter()
            .filter(|row_id| !staged(*row_id))
            .filter_map(|row_id| {
                let data = table_store.visible(*row_id, ctx.read_ts)?;
                data[*column].is_null().then(|| (*row_id, Arc::clone(data)))
            })
            .collect();

        let mut ranked: BTreeMap<RowId, (f32, Arc<[Value]>)> = BTreeMap::new();
        let mut k = wanted.saturating_sub(null_rows.len());
        while k > 0 {
            let hits = graph.search(&query, k, self.ef_search)?;
            for (row_id, _) in &hits {
                if ranked.contains_key(row_id) || staged(row_id) {
                    continue;
                }
                let Some(data) = table_store.visible(*row_id, ctx.read_ts) else {
                    continue;
                };
                if let Value::Vector(v) = &data[*column] {
                    ranked.insert(*row_id, (metric.distance(&query, v), Arc::clone(data)));
                }
            }
            if null_rows.len() + ranked.len() >= wanted || hits.len() < k || k >= graph.len() {
                break;
            }
            k = k.saturating_mul(2);
        }

        if let Some(pending) = pending {
            for (row_id, write) in pending {
                let Some(data) = &write.data else {
                    continue;
                };
                match &data[*column] {
                    Value::Vector(v) => {
                        ranked.insert(*row_id, (metric.distance(&query, v), Arc::clone(data)));
                    }
                    _ => {
                        null_rows.insert(*row_id, Arc::clone(data));
                    }
                }
            }
        }
        drop(store);

        let mut ranked: Vec<(RowId, f32, Arc<[Value]>)> =
            ranked.into_iter().map(|(id, (d, data))| (id, d, data)).collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let rows = null_rows
            .into_iter()
            .chain(ranked.into_iter().map(|(id, _, data)| (id, data)))
            .skip(offset)
            .take(limit)
            .map(|(id, data)| table_tuple(id, &data))
            .collect();
        self.buffer = RowBuffer::new(rows);
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        self.buffer.next_matching(None, ctx)
    }
}

pub struct CteScanExec<'p> {
    id: usize,
    plan: &'p PhysicalPlan,
    correlated: bool,
    rows: Rc<Vec<Tuple>>,
    position: usize,
}

impl<'p> CteScanExec<'p> {
    pub fn new(id: usize, plan: &'p PhysicalPlan, correlated: bool) -> Self {
        Self {
            id,
            plan,
            correlated,
            rows: Rc::new(Vec::new()),
            position: 0,
        }
    }
}

impl Executor for CteScanExec<'_> {
    fn open(&mut self, ctx: &ExecContext<'_>) -> Result<()> {
        self.position = 0;
        if !self.correlated {
            if let Some(rows) = ctx.cached_cte(self.id) {
                self.rows = rows;
                return Ok(());
            }
        }
        let rows = Rc::new(collect(self.plan, ctx)?);
        if !self.correlated {
            ctx.cache_cte(self.id, Rc::clone(&rows));
        }
        self.rows = rows;
        Ok(())
    }

    fn next(&mut self, _ctx: &ExecContext<'_>) -> Result<Option<Tuple>> {
        let row = self.rows.get(self.position).cloned();
        self.position += 1;
        Ok(row)
    }
}
