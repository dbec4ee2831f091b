//! # Storage Module
//!
//! The versioned row store and its durability layer.
//!
//! ## Architecture Overview
//!
//! ```text
//!   Store (behind RwLock in Database)
//!   ├── Catalog                      table and index definitions
//!   └── TableStore per table id
//!       ├── BTreeMap<RowId, VersionChain>
//!       └── Vec<TableIndex>          ordered + HNSW indexes
//!
//!   Durability (file-backed databases only)
//!   ├── wal.log                      one frame per DDL or commit
//!   └── snapshot.edb                 checkpoint image
//! ```
//!
//! Rows never change in place. A commit appends a version to each touched
//! chain and adds index entries for the new images; garbage collection later
//! removes versions that no snapshot can read, together with index entries
//! that only those versions carried.
//!
//! ## DDL Protocol
//!
//! DDL is split into a validating `prepare_*` step that leaves the store
//! untouched and an infallible-in-practice `install_*`/`remove_*` step. The
//! database logs the DDL record between the two, so a record only reaches
//! the WAL once it is known to apply, and a failed WAL write leaves the
//! store unchanged.
//!
//! ## Module Organization
//!
//! - `table`: `TableStore`, version chains plus index maintenance
//! - `wal`: frame format and append/scan/truncate
//! - `log_record`: DDL and commit payloads carried by WAL frames
//! - `snapshot`: checkpoint image encode/decode and atomic replace
//! - `durability`: recovery, commit logging and checkpointing

pub mod durability;
pub mod log_record;
pub mod snapshot;
pub mod table;
pub mod wal;

pub use durability::Durability;
pub use log_record::{DdlRecord, LogRecord, RowChange};
pub use table::TableStore;
pub use wal::{Wal, WalFrameHeader};

use eyre::Result;
use hashbrown::HashMap;
use std::sync::Arc;

use crate::error::DbError;
use crate::index::TableIndex;
use crate::mvcc::WriteSet;
use crate::schema::{Catalog, IndexDef, TableDef};
use crate::types::{CommitTs, TxnId};

/// An index built against current data, ready to be installed.
#[derive(Debug)]
pub struct PreparedIndex {
    pub table: Arc<TableDef>,
    pub index: TableIndex,
}

#[derive(Debug)]
pub struct Store {
    catalog: Catalog,
    tables: HashMap<u64, TableStore>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(),
            tables: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn table(&self, id: u64) -> Option<&TableStore> {
        self.tables.get(&id)
    }

    pub fn table_mut(&mut self, id: u64) -> Option<&mut TableStore> {
        self.tables.get_mut(&id)
    }

    pub fn table_by_name(&self, name: &str) -> Result<&TableStore> {
        let def = self.catalog.resolve_table(name)?;
        match self.tables.get(&def.id()) {
            Some(table) => Ok(table),
            None => schema_bail!("table '{}' has no storage", name),
        }
    }

    /// Validates a new table and assigns its id without registering it.
    pub fn prepare_create_table(&self, def: TableDef) -> Result<TableDef> {
        let mut scratch = self.catalog.clone();
        let created = scratch.create_table(def)?;
        Ok((*created).clone())
    }

    pub fn install_table(&mut self, def: TableDef) -> Result<Arc<TableDef>> {
        let def = self.catalog.restore_table(def)?;
        let table = TableStore::new(Arc::clone(&def))?;
        self.tables.insert(def.id(), table);
        Ok(def)
    }

    pub fn reserve_table_ids(&mut self, next: u64) {
        self.catalog.reserve_table_ids(next);
    }

    pub fn remove_table(&mut self, table_id: u64) -> Result<Arc<TableDef>> {
        let Some(def) = self.catalog.table_by_id(table_id) else {
            schema_bail!("table id {} not found", table_id);
        };
        self.catalog.drop_table(def.name())?;
        self.tables.remove(&table_id);
        Ok(def)
    }

    /// Validates a new index and builds it over the table's current rows.
    pub fn prepare_index(&self, table_name: &str, index: IndexDef) -> Result<PreparedIndex> {
        let mut scratch = self.catalog.clone();
        let updated = scratch.create_index(table_name, index.clone())?;
        let store = self.table_by_name(table_name)?;
        let built = store.build_index(&updated, &index)?;
        Ok(PreparedIndex {
            table: updated,
            index: built,
        })
    }

    pub fn install_index(&mut self, prepared: PreparedIndex) -> Result<()> {
        let name = prepared.table.name().to_string();
        let updated = self
            .catalog
            .create_index(&name, prepared.index.def().clone())?;
        match self.tables.get_mut(&updated.id()) {
            Some(table) => {
                table.install_index(updated, prepared.index);
                Ok(())
            }
            None => schema_bail!("table '{}' has no storage", name),
        }
    }

    pub fn remove_index(&mut self, name: &str) -> Result<(Arc<TableDef>, IndexDef)> {
        let (updated, removed) = self.catalog.drop_index(name)?;
        if let Some(table) = self.tables.get_mut(&updated.id()) {
            table.remove_index(Arc::clone(&updated), removed.name());
        }
        Ok((updated, removed))
    }

    /// Replays a logged DDL record.
    pub fn apply_ddl(&mut self, record: &DdlRecord) -> Result<()> {
        match record {
            DdlRecord::CreateTable(def) => {
                self.install_table(def.clone())?;
            }
            DdlRecord::DropTable { table_id } => {
                self.remove_table(*table_id)?;
            }
            DdlRecord::CreateIndex { table_id, index } => {
                let Some(def) = self.catalog.table_by_id(*table_id) else {
                    schema_bail!("table id {} not found", table_id);
                };
                let prepared = self.prepare_index(def.name(), index.clone())?;
                self.install_index(prepared)?;
            }
            DdlRecord::DropIndex { name } => {
                self.remove_index(name)?;
            }
        }
        Ok(())
    }

    /// Checks a transaction's writes against everything committed since
    /// `read_ts`. Must run under the commit guard.
    pub fn validate_commit(&self, writes: &WriteSet, read_ts: CommitTs) -> Result<()> {
        for (table_id, rows) in writes.tables() {
            let Some(table) = self.tables.get(&table_id) else {
                return Err(DbError::schema(format!(
                    "table written by this transaction (id {}) was dropped",
                    table_id
                )));
            };
            table.validate_writes(read_ts, rows)?;
        }
        Ok(())
    }

    /// Flattens a write set into the changes a commit record carries.
    pub fn changes_for(writes: &WriteSet) -> Vec<RowChange> {
        writes
            .tables()
            .flat_map(|(table_id, rows)| {
                rows.iter().map(move |(row_id, write)| RowChange {
                    table_id,
                    row_id: *row_id,
                    data: write.data.clone(),
                })
            })
            .collect()
    }

    pub fn apply_commit(
        &mut self,
        commit_ts: CommitTs,
        txn_id: TxnId,
        changes: &[RowChange],
    ) -> Result<()> {
        for change in changes {
            let Some(table) = self.tables.get_mut(&change.table_id) else {
                return Err(DbError::corruption(format!(
                    "commit {} references unknown table id {}",
                    commit_ts, change.table_id
                )));
            };
            table.apply(
                change.row_id,
                table::committed_version(commit_ts, txn_id, change.data.clone()),
            )?;
        }
        Ok(())
    }

    /// Reclaims versions no snapshot at or after `watermark` can read.
    pub fn collect_garbage(&mut self, watermark: CommitTs) -> Result<usize> {
        let mut reclaimed = 0;
        for table in self.tables.values_mut() {
            reclaimed += table.collect_garbage(watermark)?;
        }
        Ok(reclaimed)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::hnsw::{DistanceMetric, HnswParams};
    use crate::schema::{ColumnDef, Constraint, IndexKind};
    use crate::types::{DataType, Value};

    fn docs_def() -> TableDef {
        TableDef::new(
            0,
            "docs",
            vec![
                ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                ColumnDef::new("embedding", DataType::Vector(2)),
            ],
        )
        .unwrap()
    }

    fn store() -> (Store, u64) {
        let mut store = Store::new();
        let def = store.prepare_create_table(docs_def()).unwrap();
        let id = store.install_table(def).unwrap().id();
        (store, id)
    }

    fn change(table_id: u64, row_id: u64, id: i64, v: [f32; 2]) -> RowChange {
        RowChange {
            table_id,
            row_id,
            data: Some(Arc::from(vec![Value::Integer(id), Value::Vector(v.to_vec())])),
        }
    }

    #[test]
    fn prepare_leaves_store_untouched() {
        let (store, _) = store();
        let again = store.prepare_create_table(docs_def());
        assert!(again.is_err());
        assert_eq!(store.catalog().table_names(), vec!["docs".to_string()]);
    }

    #[test]
    fn index_built_from_existing_rows() {
        let (mut store, id) = store();
        store
            .apply_commit(1, 1, &[change(id, 1, 1, [1.0, 0.0]), change(id, 2, 2, [0.0, 1.0])])
            .unwrap();

        let hnsw = IndexDef::new(
            "docs_vec",
            vec!["embedding".into()],
            false,
            IndexKind::Hnsw {
                metric: DistanceMetric::L2,
                params: HnswParams::default(),
            },
        );
        let prepared = store.prepare_index("docs", hnsw).unwrap();
        store.install_index(prepared).unwrap();

        let table = store.table(id).unwrap();
        let graph = table.index("docs_vec").unwrap().as_hnsw().unwrap();
        assert_eq!(graph.len(), 2);
        assert!(store.catalog().find_index("docs_vec").is_some());

        store.remove_index("docs_vec").unwrap();
        assert!(store.table(id).unwrap().index("docs_vec").is_none());
    }

    #[test]
    fn commit_against_dropped_table_fails() {
        let (mut store, id) = store();
        let mut writes = WriteSet::new();
        writes.insert(id, 1, Arc::from(vec![Value::Integer(1), Value::Null]));

        store.remove_table(id).unwrap();
        let err = store.validate_commit(&writes, 0).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
    }

    #[test]
    fn ddl_replay_rebuilds_catalog() {
        let (store, _) = store();
        let def = (*store.catalog().get_table("docs").unwrap()).clone();

        let mut replayed = Store::new();
        replayed.apply_ddl(&DdlRecord::CreateTable(def.clone())).unwrap();
        replayed
            .apply_ddl(&DdlRecord::CreateIndex {
                table_id: def.id(),
                index: IndexDef::btree("docs_emb_id", vec!["id".into()], false),
            })
            .unwrap();
        replayed.apply_ddl(&DdlRecord::DropTable { table_id: def.id() }).unwrap();
        assert!(replayed.catalog().table_names().is_empty());
    }
}
