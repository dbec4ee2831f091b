//! # Durability
//!
//! Owns the WAL of a file-backed database and the snapshot beside it.
//!
//! ## Recovery
//!
//! ```text
//! 1. load snapshot.edb (if any)      catalog + latest rows, indexes rebuilt
//! 2. scan wal.log                    stop at the first torn or bad frame
//! 3. replay frames with lsn > snapshot.last_lsn, in order
//! 4. truncate the torn tail and reopen the WAL for appending
//! ```
//!
//! A crash between installing a snapshot and truncating the WAL leaves
//! frames the snapshot already covers; step 3 skips them by LSN.
//!
//! ## Checkpoint
//!
//! Writes the latest committed image to a new snapshot, then truncates the
//! WAL. The caller holds the commit guard so no commit interleaves.

use eyre::{Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::log_record::LogRecord;
use super::snapshot::{encode_snapshot, read_snapshot, write_snapshot};
use super::wal::Wal;
use super::Store;
use crate::config::WAL_FILE_NAME;
use crate::database::SyncMode;
use crate::error::DbError;
use crate::types::CommitTs;

/// State reconstructed from disk.
#[derive(Debug)]
pub struct Recovered {
    pub store: Store,
    pub last_commit_ts: CommitTs,
    pub frames_replayed: usize,
}

#[derive(Debug)]
pub struct Durability {
    dir: PathBuf,
    wal: Wal,
    checkpoint_threshold: u64,
}

impl Durability {
    /// Opens (creating if needed) the database directory and recovers its
    /// committed state.
    pub fn open(dir: &Path, sync_mode: SyncMode, checkpoint_threshold: u64) -> Result<(Self, Recovered)> {
        fs::create_dir_all(dir)
            .map_err(DbError::io)
            .wrap_err_with(|| format!("failed to create database directory '{}'", dir.display()))?;

        let mut store = Store::new();
        let mut last_commit_ts = 0;
        let mut last_lsn = 0;

        if let Some(image) = read_snapshot(dir)? {
            last_commit_ts = image.last_commit_ts;
            last_lsn = image.last_lsn;
            for def in image.tables {
                store.install_table(def)?;
            }
            for table_image in image.data {
                let Some(table) = store.table_mut(table_image.table_id) else {
                    return Err(DbError::corruption(format!(
                        "snapshot rows reference unknown table id {}",
                        table_image.table_id
                    )));
                };
                for (row_id, data) in table_image.rows {
                    table.load(row_id, data, last_commit_ts)?;
                }
                if table_image.next_row_id > 0 {
                    table.observe_row_id(table_image.next_row_id - 1);
                }
            }
            store.reserve_table_ids(image.next_table_id);
            debug!(
                last_commit_ts,
                last_lsn,
                tables = store.catalog().table_names().len(),
                "snapshot loaded"
            );
        }

        let wal_path = dir.join(WAL_FILE_NAME);
        let scan = Wal::scan(&wal_path)?;
        if scan.torn_bytes > 0 {
            warn!(
                path = %wal_path.display(),
                bytes = scan.torn_bytes,
                "discarding torn WAL tail"
            );
        }

        let mut replayed = 0;
        let mut max_lsn = last_lsn;
        for frame in &scan.frames {
            max_lsn = max_lsn.max(frame.lsn);
            if frame.lsn <= last_lsn {
                continue;
            }
            let record = LogRecord::decode(frame.kind, &frame.payload)
                .wrap_err_with(|| format!("failed to decode WAL frame {}", frame.lsn))?;
            match record {
                LogRecord::Ddl(ddl) => store
                    .apply_ddl(&ddl)
                    .wrap_err_with(|| format!("failed to replay WAL frame {}", frame.lsn))?,
                LogRecord::Commit { commit_ts, changes } => {
                    store
                        .apply_commit(commit_ts, 0, &changes)
                        .wrap_err_with(|| format!("failed to replay WAL frame {}", frame.lsn))?;
                    last_commit_ts = last_commit_ts.max(commit_ts);
                }
            }
            replayed += 1;
        }

        let wal = Wal::open(&wal_path, scan.valid_len, max_lsn + 1, sync_mode)?;
        info!(
            path = %dir.display(),
            frames = replayed,
            last_commit_ts,
            "recovery complete"
        );

        Ok((
            Self {
                dir: dir.to_path_buf(),
                wal,
                checkpoint_threshold,
            },
            Recovered {
                store,
                last_commit_ts,
                frames_replayed: replayed,
            },
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.wal.sync_mode()
    }

    pub fn set_sync_mode(&mut self, sync_mode: SyncMode) {
        self.wal.set_sync_mode(sync_mode);
    }

    pub fn checkpoint_threshold(&self) -> u64 {
        self.checkpoint_threshold
    }

    pub fn wal_size(&self) -> u64 {
        self.wal.size()
    }

    /// Appends one record. Returns once the record is as durable as the
    /// sync mode requires.
    pub fn log(&mut self, record: &LogRecord) -> Result<u64> {
        let (kind, payload) = record.encode()?;
        self.wal.append(kind, &payload)
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint(self.checkpoint_threshold)
    }

    /// Captures `store` in a fresh snapshot and empties the WAL.
    pub fn checkpoint(&mut self, store: &Store, last_commit_ts: CommitTs) -> Result<()> {
        self.wal.sync()?;
        let last_lsn = self.wal.next_lsn().saturating_sub(1);
        let (bytes, rows) = encode_snapshot(store, last_commit_ts, last_lsn)?;
        write_snapshot(&self.dir, &bytes)?;

        let wal_bytes = self.wal.size();
        self.wal.truncate()?;
        info!(
            rows,
            snapshot_bytes = bytes.len(),
            wal_bytes,
            "checkpoint complete"
        );
        Ok(())
    }

    /// Flushes and fsyncs any buffered WAL frames.
    pub fn sync(&mut self) -> Result<()> {
        self.wal.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Constraint, TableDef};
    use crate::storage::{DdlRecord, RowChange};
    use crate::types::{DataType, Value};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn table() -> TableDef {
        TableDef::new(
            1,
            "kv",
            vec![
                ColumnDef::new("k", DataType::Text).with_constraint(Constraint::PrimaryKey),
                ColumnDef::new("v", DataType::Integer),
            ],
        )
        .unwrap()
    }

    fn put(row_id: u64, k: &str, v: i64) -> RowChange {
        RowChange {
            table_id: 1,
            row_id,
            data: Some(Arc::from(vec![Value::Text(k.into()), Value::Integer(v)])),
        }
    }

    #[test]
    fn replays_wal_after_reopen() {
        let dir = tempdir().unwrap();
        {
            let (mut durability, _) = Durability::open(dir.path(), SyncMode::Full, u64::MAX).unwrap();
            durability
                .log(&LogRecord::Ddl(DdlRecord::CreateTable(table())))
                .unwrap();
            durability
                .log(&LogRecord::Commit {
                    commit_ts: 1,
                    changes: vec![put(1, "a", 1), put(2, "b", 2)],
                })
                .unwrap();
        }

        let (_, recovered) = Durability::open(dir.path(), SyncMode::Full, u64::MAX).unwrap();
        assert_eq!(recovered.last_commit_ts, 1);
        assert_eq!(recovered.frames_replayed, 2);
        let kv = recovered.store.table_by_name("kv").unwrap();
        assert_eq!(kv.latest_rows().count(), 2);
        assert_eq!(kv.allocate_row_id(), 3);
    }

    #[test]
    fn checkpoint_then_more_commits() {
        let dir = tempdir().unwrap();
        {
            let (mut durability, mut recovered) =
                Durability::open(dir.path(), SyncMode::Normal, u64::MAX).unwrap();
            let store = &mut recovered.store;

            let ddl = DdlRecord::CreateTable(table());
            durability.log(&LogRecord::Ddl(ddl.clone())).unwrap();
            store.apply_ddl(&ddl).unwrap();

            let changes = vec![put(1, "a", 1)];
            durability
                .log(&LogRecord::Commit {
                    commit_ts: 1,
                    changes: changes.clone(),
                })
                .unwrap();
            store.apply_commit(1, 1, &changes).unwrap();

            durability.checkpoint(store, 1).unwrap();
            assert_eq!(durability.wal_size(), 0);

            durability
                .log(&LogRecord::Commit {
                    commit_ts: 2,
                    changes: vec![put(1, "a", 10)],
                })
                .unwrap();
            durability.sync().unwrap();
        }

        let (_, recovered) = Durability::open(dir.path(), SyncMode::Full, u64::MAX).unwrap();
        assert_eq!(recovered.last_commit_ts, 2);
        let kv = recovered.store.table_by_name("kv").unwrap();
        let rows: Vec<_> = kv.latest_rows().map(|(_, d)| d[1].clone()).collect();
        assert_eq!(rows, vec![Value::Integer(10)]);
    }
}
