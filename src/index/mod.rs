//! # Secondary Indexes
//!
//! Ordered (B-tree) indexes over one or more columns. Vector indexes live in
//! `crate::hnsw`; `TableIndex` wraps either kind so a table can maintain its
//! indexes uniformly on commit and garbage collection.
//!
//! ## Entry Model
//!
//! An index is a superset of live data: it holds one entry per distinct key
//! among all retained versions of a row. Readers always re-check the visible
//! version, so a stale entry costs a lookup but never a wrong answer.
//! Garbage collection drops an entry once no retained version carries its key.
//!
//! An HNSW index cannot place a NULL vector in its graph, so it keeps the
//! ids of rows with a NULL vector version in a side set instead.

mod ordered;

pub use ordered::{KeyRange, OrderedIndex};

use eyre::Result;
use std::collections::BTreeSet;

use crate::hnsw::HnswIndex;
use crate::schema::{IndexDef, IndexKind, TableDef};
use crate::types::{RowId, Value};

#[derive(Debug)]
pub enum TableIndex {
    Ordered(OrderedIndex),
    Hnsw {
        def: IndexDef,
        column: usize,
        graph: HnswIndex,
        nulls: BTreeSet<RowId>,
    },
}

impl TableIndex {
    pub fn build(table: &TableDef, def: &IndexDef) -> Result<Self> {
        let positions = table.index_column_positions(def);
        match def.kind() {
            IndexKind::BTree => Ok(TableIndex::Ordered(OrderedIndex::new(def.clone(), positions))),
            IndexKind::Hnsw { metric, params } => {
                let column = positions[0];
                let dims = table.columns()[column]
                    .data_type()
                    .vector_dims()
                    .unwrap_or_default() as usize;
                Ok(TableIndex::Hnsw {
                    def: def.clone(),
                    column,
                    graph: HnswIndex::new(dims, metric, params),
                    nulls: BTreeSet::new(),
                })
            }
        }
    }

    pub fn def(&self) -> &IndexDef {
        match self {
            TableIndex::Ordered(index) => index.def(),
            TableIndex::Hnsw { def, .. } => def,
        }
    }

    pub fn name(&self) -> &str {
        self.def().name()
    }

    /// Adds the entry for one committed row version.
    pub fn insert(&mut self, row_id: RowId, row: &[Value]) -> Result<()> {
        match self {
            TableIndex::Ordered(index) => {
                index.insert(row_id, row);
                Ok(())
            }
            TableIndex::Hnsw {
                column,
                graph,
                nulls,
                ..
            } => match &row[*column] {
                Value::Vector(v) => graph.insert(row_id, v),
                _ => {
                    nulls.insert(row_id);
                    Ok(())
                }
            },
        }
    }

    /// Removes the entry for a row version that no longer exists.
    pub fn remove(&mut self, row_id: RowId, row: &[Value]) {
        match self {
            TableIndex::Ordered(index) => {
                index.remove(row_id, row);
            }
            TableIndex::Hnsw {
                column,
                graph,
                nulls,
                ..
            } => match &row[*column] {
                Value::Vector(v) => {
                    graph.remove(row_id, v);
                }
                _ => {
                    nulls.remove(&row_id);
                }
            },
        }
    }

    /// True when two row images produce the same entry in this index.
    pub fn same_entry(&self, a: &[Value], b: &[Value]) -> bool {
        match self {
            TableIndex::Ordered(index) => index.key_for(a) == index.key_for(b),
            TableIndex::Hnsw { column, .. } => a[*column] == b[*column],
        }
    }

    pub fn as_ordered(&self) -> Option<&OrderedIndex> {
        match self {
            TableIndex::Ordered(index) => Some(index),
            TableIndex::Hnsw { .. } => None,
        }
    }

    pub fn as_hnsw(&self) -> Option<&HnswIndex> {
        match self {
            TableIndex::Hnsw { graph, .. } => Some(graph),
            TableIndex::Ordered(_) => None,
        }
    }

    /// Rebuilds an HNSW graph once tombstones dominate it.
    pub fn maybe_compact(&mut self) -> Result<()> {
        if let TableIndex::Hnsw { graph, .. } = self {
            if graph.needs_compaction() {
                graph.compact()?;
            }
        }
        Ok(())
    }
}
