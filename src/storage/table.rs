//! Per-table row store: version chains keyed by row id plus the table's
//! indexes.

use eyre::Result;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::DbError;
use crate::index::TableIndex;
use crate::mvcc::{PendingWrite, RowVersion, VersionChain};
use crate::schema::{IndexDef, TableDef};
use crate::types::{CommitTs, RowId, TxnId, Value};

#[derive(Debug)]
pub struct TableStore {
    def: Arc<TableDef>,
    rows: BTreeMap<RowId, VersionChain>,
    next_row_id: AtomicU64,
    indexes: Vec<TableIndex>,
}

impl TableStore {
    pub fn new(def: Arc<TableDef>) -> Result<Self> {
        let indexes = def
            .indexes()
            .iter()
            .map(|index| TableIndex::build(&def, index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            def,
            rows: BTreeMap::new(),
            next_row_id: AtomicU64::new(1),
            indexes,
        })
    }

    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    pub fn id(&self) -> u64 {
        self.def.id()
    }

    /// Hands out a fresh row id. Ids are never reused, even when the
    /// inserting transaction rolls back.
    pub fn allocate_row_id(&self) -> RowId {
        self.next_row_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_row_id(&self) -> RowId {
        self.next_row_id.load(Ordering::Relaxed)
    }

    /// Ensures ids handed out later stay above `row_id`.
    pub fn observe_row_id(&mut self, row_id: RowId) {
        let next = self.next_row_id.get_mut();
        if *next <= row_id {
            *next = row_id + 1;
        }
    }

    pub fn chain(&self, row_id: RowId) -> Option<&VersionChain> {
        self.rows.get(&row_id)
    }

    pub fn visible(&self, row_id: RowId, read_ts: CommitTs) -> Option<&Arc<[Value]>> {
        self.rows.get(&row_id).and_then(|c| c.visible_data(read_ts))
    }

    /// Rows visible at `read_ts`, in row id order.
    pub fn visible_rows(
        &self,
        read_ts: CommitTs,
    ) -> impl Iterator<Item = (RowId, &Arc<[Value]>)> + '_ {
        self.rows
            .iter()
            .filter_map(move |(id, chain)| chain.visible_data(read_ts).map(|d| (*id, d)))
    }

    /// Newest committed image of every live row.
    pub fn latest_rows(&self) -> impl Iterator<Item = (RowId, &Arc<[Value]>)> + '_ {
        self.rows
            .iter()
            .filter_map(|(id, chain)| chain.latest_data().map(|d| (*id, d)))
    }

    /// Number of chains, including rows whose latest version is a deletion.
    pub fn chain_count(&self) -> usize {
        self.rows.len()
    }

    pub fn version_count(&self) -> usize {
        self.rows.values().map(VersionChain::len).sum()
    }

    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&TableIndex> {
        self.indexes
            .iter()
            .find(|i| i.name().eq_ignore_ascii_case(name))
    }

    /// Publishes one committed version and its index entries.
    pub fn apply(&mut self, row_id: RowId, version: RowVersion) -> Result<()> {
        if let Some(data) = &version.data {
            for index in &mut self.indexes {
                index.insert(row_id, data)?;
            }
        }
        self.observe_row_id(row_id);
        match self.rows.get_mut(&row_id) {
            Some(chain) => chain.push(version),
            None => {
                self.rows.insert(row_id, VersionChain::new(version));
            }
        }
        Ok(())
    }

    /// Loads a row image recovered from durable storage.
    pub fn load(&mut self, row_id: RowId, data: Arc<[Value]>, commit_ts: CommitTs) -> Result<()> {
        self.apply(
            row_id,
            RowVersion {
                commit_ts,
                txn_id: 0,
                data: Some(data),
            },
        )
    }

    /// Builds an index over every retained version without installing it.
    /// A unique index fails if two live rows already share a key.
    pub fn build_index(&self, def: &Arc<TableDef>, index: &IndexDef) -> Result<TableIndex> {
        let mut built = TableIndex::build(def, index)?;
        for (row_id, chain) in &self.rows {
            for version in chain.versions() {
                if let Some(data) = &version.data {
                    built.insert(*row_id, data)?;
                }
            }
        }

        if let Some(ordered) = built.as_ordered().filter(|o| o.is_unique()) {
            let mut seen = hashbrown::HashSet::new();
            for (_, data) in self.latest_rows() {
                if ordered.key_has_null(data) {
                    continue;
                }
                if !seen.insert(ordered.key_for(data)) {
                    schema_bail!(
                        "cannot create unique index '{}': duplicate key in existing rows",
                        index.name()
                    );
                }
            }
        }
        Ok(built)
    }

    pub fn install_index(&mut self, def: Arc<TableDef>, index: TableIndex) {
        self.def = def;
        self.indexes.push(index);
    }

    pub fn remove_index(&mut self, def: Arc<TableDef>, name: &str) {
        self.def = def;
        self.indexes.retain(|i| !i.name().eq_ignore_ascii_case(name));
    }

    /// Fails if `row` would duplicate a key of a unique index held by
    /// another row. Other rows are seen as of their latest committed
    /// version, overlaid with `writes` staged by the same transaction.
    pub fn check_unique(
        &self,
        row_id: RowId,
        row: &[Value],
        writes: Option<&BTreeMap<RowId, PendingWrite>>,
    ) -> Result<()> {
        for index in self.indexes.iter().filter_map(TableIndex::as_ordered) {
            if !index.is_unique() || index.key_has_null(row) {
                continue;
            }
            let key = index.key_for(row);
            for other in index.lookup(&key) {
                if other == row_id {
                    continue;
                }
                let current = match writes.and_then(|w| w.get(&other)) {
                    Some(write) => write.data.as_ref(),
                    None => self.rows.get(&other).and_then(VersionChain::latest_data),
                };
                if current.is_some_and(|data| index.key_for(data) == key) {
                    return Err(duplicate_key(index.def()));
                }
            }
        }
        Ok(())
    }

    /// Commit-time validation of one transaction's writes to this table:
    /// first-committer-wins on every row it changed, then uniqueness across
    /// the committed rows and the staged rows together.
    pub fn validate_writes(
        &self,
        read_ts: CommitTs,
        writes: &BTreeMap<RowId, PendingWrite>,
    ) -> Result<()> {
        for (row_id, write) in writes {
            if write.inserted {
                continue;
            }
            let changed = self
                .rows
                .get(row_id)
                .map_or(true, |chain| chain.latest_ts() > read_ts);
            if changed {
                return Err(DbError::conflict(format!(
                    "row {} of table '{}' was modified by a concurrent transaction",
                    row_id,
                    self.def.name()
                )));
            }
        }

        for index in self.indexes.iter().filter_map(TableIndex::as_ordered) {
            if !index.is_unique() {
                continue;
            }
            let mut staged: hashbrown::HashMap<Vec<u8>, RowId> = hashbrown::HashMap::new();
            for (row_id, write) in writes {
                let Some(data) = &write.data else {
                    continue;
                };
                if index.key_has_null(data) {
                    continue;
                }
                let key = index.key_for(data);
                if staged.insert(key.clone(), *row_id).is_some() {
                    return Err(duplicate_key(index.def()));
                }
                for other in index.lookup(&key) {
                    if other == *row_id || writes.contains_key(&other) {
                        continue;
                    }
                    let clash = self
                        .rows
                        .get(&other)
                        .and_then(VersionChain::latest_data)
                        .is_some_and(|d| index.key_for(d) == key);
                    if clash {
                        return Err(duplicate_key(index.def()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops versions below `watermark` and the index entries only they
    /// carried. Returns the number of versions reclaimed.
    pub fn collect_garbage(&mut self, watermark: CommitTs) -> Result<usize> {
        let mut reclaimed = 0;
        let mut emptied = Vec::new();

        for (row_id, chain) in self.rows.iter_mut() {
            let removed = chain.collect_garbage(watermark);
            if removed.is_empty() {
                continue;
            }
            reclaimed += removed.len();

            for data in removed.iter().filter_map(|v| v.data.as_ref()) {
                for index in &mut self.indexes {
                    let still_used = chain
                        .versions()
                        .filter_map(|v| v.data.as_ref())
                        .any(|kept| index.same_entry(kept, data));
                    if !still_used {
                        index.remove(*row_id, data);
                    }
                }
            }
            if chain.is_empty() {
                emptied.push(*row_id);
            }
        }

        for row_id in emptied {
            self.rows.remove(&row_id);
        }
        for index in &mut self.indexes {
            index.maybe_compact()?;
        }
        Ok(reclaimed)
    }
}

pub(crate) fn duplicate_key(index: &IndexDef) -> eyre::Report {
    DbError::schema(format!(
        "duplicate key value violates unique constraint '{}'",
        index.name()
    ))
}

/// Version published for `txn_id` at `commit_ts`.
pub fn committed_version(
    commit_ts: CommitTs,
    txn_id: TxnId,
    data: Option<Arc<[Value]>>,
) -> RowVersion {
    RowVersion {
        commit_ts,
        txn_id,
        data,
    }
}
