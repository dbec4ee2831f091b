//! # Transaction Write Set
//!
//! Private staging area for a transaction's uncommitted changes, keyed by
//! table id and row id. Readers in the same transaction overlay it onto
//! their snapshot; commit turns it into new versions.
//!
//! ## Statement Atomicity
//!
//! Every change records the entry it replaced in an undo log. A statement
//! takes a `SavePoint` before it starts and rolls back to it on error, so a
//! failed statement leaves the transaction exactly as it was while earlier
//! statements stay staged.
//!
//! ## Entry States
//!
//! | `inserted` | `data` | Meaning |
//! |-----------|--------|---------|
//! | true  | Some | row created by this transaction |
//! | false | Some | committed row updated by this transaction |
//! | false | None | committed row deleted by this transaction |
//!
//! Deleting a row the transaction itself inserted removes the entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::{RowId, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub data: Option<Arc<[Value]>>,
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePoint(usize);

#[derive(Debug)]
struct UndoEntry {
    table_id: u64,
    row_id: RowId,
    previous: Option<PendingWrite>,
}

#[derive(Debug, Default)]
pub struct WriteSet {
    tables: BTreeMap<u64, BTreeMap<RowId, PendingWrite>>,
    undo: Vec<UndoEntry>,
    discarded: Vec<u64>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|rows| rows.is_empty())
    }

    /// Number of staged row changes.
    pub fn len(&self) -> usize {
        self.tables.values().map(|rows| rows.len()).sum()
    }

    pub fn get(&self, table_id: u64, row_id: RowId) -> Option<&PendingWrite> {
        self.tables.get(&table_id).and_then(|rows| rows.get(&row_id))
    }

    pub fn table(&self, table_id: u64) -> Option<&BTreeMap<RowId, PendingWrite>> {
        self.tables.get(&table_id).filter(|rows| !rows.is_empty())
    }

    pub fn tables(&self) -> impl Iterator<Item = (u64, &BTreeMap<RowId, PendingWrite>)> {
        self.tables
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(id, rows)| (*id, rows))
    }

    pub fn insert(&mut self, table_id: u64, row_id: RowId, data: Arc<[Value]>) {
        self.put(
            table_id,
            row_id,
            Some(PendingWrite {
                data: Some(data),
                inserted: true,
            }),
        );
    }

    /// Stages a new image for an existing row (committed or own insert).
    pub fn update(&mut self, table_id: u64, row_id: RowId, data: Arc<[Value]>) {
        let inserted = self.get(table_id, row_id).is_some_and(|w| w.inserted);
        self.put(
            table_id,
            row_id,
            Some(PendingWrite {
                data: Some(data),
                inserted,
            }),
        );
    }

    pub fn delete(&mut self, table_id: u64, row_id: RowId) {
        let inserted = self.get(table_id, row_id).is_some_and(|w| w.inserted);
        if inserted {
            self.put(table_id, row_id, None);
        } else {
            self.put(
                table_id,
                row_id,
                Some(PendingWrite {
                    data: None,
                    inserted: false,
                }),
            );
        }
    }

    fn put(&mut self, table_id: u64, row_id: RowId, write: Option<PendingWrite>) {
        let rows = self.tables.entry(table_id).or_default();
        let previous = match write {
            Some(w) => rows.insert(row_id, w),
            None => rows.remove(&row_id),
        };
        self.undo.push(UndoEntry {
            table_id,
            row_id,
            previous,
        });
    }

    pub fn mark(&self) -> SavePoint {
        SavePoint(self.undo.len())
    }

    /// Reverts every change made after `savepoint`.
    pub fn rollback_to(&mut self, savepoint: SavePoint) {
        while self.undo.len() > savepoint.0 {
            let Some(entry) = self.undo.pop() else {
                break;
            };
            if self.discarded.contains(&entry.table_id) {
                continue;
            }
            let rows = self.tables.entry(entry.table_id).or_default();
            match entry.previous {
                Some(previous) => {
                    rows.insert(entry.row_id, previous);
                }
                None => {
                    rows.remove(&entry.row_id);
                }
            }
        }
    }

    /// Forgets staged writes against a table that no longer exists.
    pub fn discard_table(&mut self, table_id: u64) {
        self.tables.remove(&table_id);
        if !self.discarded.contains(&table_id) {
            self.discarded.push(table_id);
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.undo.clear();
        self.discarded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(v: i64) -> Arc<[Value]> {
        Arc::from(vec![Value::Integer(v)])
    }

    #[test]
    fn delete_of_own_insert_removes_entry() {
        let mut ws = WriteSet::new();
        ws.insert(1, 10, row(1));
        ws.update(1, 10, row(2));
        assert!(ws.get(1, 10).unwrap().inserted);

        ws.delete(1, 10);
        assert!(ws.get(1, 10).is_none());
        assert!(ws.is_empty());
    }

    #[test]
    fn delete_of_committed_row_stages_marker() {
        let mut ws = WriteSet::new();
        ws.delete(1, 5);
        let write = ws.get(1, 5).unwrap();
        assert!(write.data.is_none());
        assert!(!write.inserted);
    }

    #[test]
    fn rollback_to_savepoint_restores_previous_state() {
        let mut ws = WriteSet::new();
        ws.insert(1, 1, row(1));
        let sp = ws.mark();

        ws.update(1, 1, row(99));
        ws.insert(1, 2, row(2));
        ws.delete(1, 3);
        ws.rollback_to(sp);

        assert_eq!(ws.len(), 1);
        assert_eq!(ws.get(1, 1).unwrap().data.as_ref().unwrap()[0], Value::Integer(1));
    }

    #[test]
    fn discard_table_drops_its_rows() {
        let mut ws = WriteSet::new();
        ws.insert(1, 1, row(1));
        ws.insert(2, 1, row(1));
        ws.discard_table(1);
        assert_eq!(ws.len(), 1);
        assert!(ws.table(1).is_none());
    }
}
