//! # Snapshot File
//!
//! A checkpoint writes the catalog and the latest committed image of every
//! row to `snapshot.edb`. The file is written to a temporary name, fsynced
//! and renamed over the old snapshot, so a crash leaves either the old or the
//! new image, never a mix.
//!
//! ## Layout
//!
//! ```text
//! magic "EMBERSN1" | version u32 | last_commit_ts u64 | last_lsn u64
//! catalog_json (u32 length + bytes)
//! table_count u32
//! table*: table_id u64 | next_row_id u64 | row_count u64 | (row_id u64, row)*
//! crc64 u64 over every preceding byte
//! ```
//!
//! Rows use `RecordCodec`. Integers are big-endian.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use super::Store;
use crate::config::{SNAPSHOT_FILE_NAME, SNAPSHOT_MAGIC, SNAPSHOT_TEMP_FILE_NAME, SNAPSHOT_VERSION};
use crate::encoding::{put_bytes, put_u32, put_u64, ByteReader, RecordCodec};
use crate::error::DbError;
use crate::schema::TableDef;
use crate::types::{CommitTs, RowId, Value};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[derive(Debug, Serialize, Deserialize)]
struct CatalogImage {
    next_table_id: u64,
    tables: Vec<TableDef>,
}

#[derive(Debug)]
pub struct TableImage {
    pub table_id: u64,
    pub next_row_id: RowId,
    pub rows: Vec<(RowId, Arc<[Value]>)>,
}

#[derive(Debug)]
pub struct SnapshotImage {
    pub last_commit_ts: CommitTs,
    pub last_lsn: u64,
    pub next_table_id: u64,
    pub tables: Vec<TableDef>,
    pub data: Vec<TableImage>,
}

/// Serializes the latest committed state of `store`. Returns the bytes and
/// the number of rows written.
pub fn encode_snapshot(store: &Store, last_commit_ts: CommitTs, last_lsn: u64) -> Result<(Vec<u8>, usize)> {
    let catalog = CatalogImage {
        next_table_id: store.catalog().next_table_id(),
        tables: store.catalog().tables().map(|t| (**t).clone()).collect(),
    };
    let catalog_json = serde_json::to_vec(&catalog).wrap_err("failed to serialize catalog")?;

    let mut buf = Vec::with_capacity(4096);
    buf.extend_from_slice(SNAPSHOT_MAGIC);
    put_u32(&mut buf, SNAPSHOT_VERSION);
    put_u64(&mut buf, last_commit_ts);
    put_u64(&mut buf, last_lsn);
    put_bytes(&mut buf, &catalog_json);

    let tables: Vec<_> = store.catalog().tables().filter_map(|t| store.table(t.id())).collect();
    put_u32(&mut buf, tables.len() as u32);

    let mut total_rows = 0;
    for table in tables {
        put_u64(&mut buf, table.id());
        put_u64(&mut buf, table.next_row_id());
        let count_at = buf.len();
        put_u64(&mut buf, 0);

        let mut count = 0u64;
        for (row_id, data) in table.latest_rows() {
            put_u64(&mut buf, row_id);
            RecordCodec::encode_row_into(data, &mut buf);
            count += 1;
        }
        buf[count_at..count_at + 8].copy_from_slice(&count.to_be_bytes());
        total_rows += count as usize;
    }

    let checksum = CRC64.checksum(&buf);
    put_u64(&mut buf, checksum);
    Ok((buf, total_rows))
}

pub fn decode_snapshot(data: &[u8]) -> Result<SnapshotImage> {
    if data.len() < SNAPSHOT_MAGIC.len() + 8 {
        return Err(DbError::corruption("snapshot file is truncated"));
    }
    let (body, tail) = data.split_at(data.len() - 8);
    let mut stored = [0u8; 8];
    stored.copy_from_slice(tail);
    if CRC64.checksum(body) != u64::from_be_bytes(stored) {
        return Err(DbError::corruption("snapshot checksum mismatch"));
    }

    let mut reader = ByteReader::new(body);
    if reader.read_slice(SNAPSHOT_MAGIC.len())? != SNAPSHOT_MAGIC {
        return Err(DbError::corruption("not an emberdb snapshot"));
    }
    let version = reader.read_u32()?;
    if version != SNAPSHOT_VERSION {
        return Err(DbError::corruption(format!(
            "unsupported snapshot version {}",
            version
        )));
    }
    let last_commit_ts = reader.read_u64()?;
    let last_lsn = reader.read_u64()?;
    let catalog: CatalogImage = serde_json::from_slice(reader.read_bytes()?)
        .map_err(|e| DbError::corruption(format!("malformed snapshot catalog: {}", e)))?;

    let table_count = reader.read_u32()? as usize;
    let mut images = Vec::with_capacity(table_count.min(1024));
    for _ in 0..table_count {
        let table_id = reader.read_u64()?;
        let next_row_id = reader.read_u64()?;
        let row_count = reader.read_u64()?;
        let mut rows = Vec::new();
        for _ in 0..row_count {
            let row_id = reader.read_u64()?;
            let row = RecordCodec::decode_row(&mut reader)?;
            rows.push((row_id, Arc::from(row)));
        }
        images.push(TableImage {
            table_id,
            next_row_id,
            rows,
        });
    }
    if !reader.is_empty() {
        return Err(DbError::corruption("trailing bytes in snapshot"));
    }

    Ok(SnapshotImage {
        last_commit_ts,
        last_lsn,
        next_table_id: catalog.next_table_id,
        tables: catalog.tables,
        data: images,
    })
}

/// Atomically replaces the snapshot in `dir`.
pub fn write_snapshot(dir: &Path, bytes: &[u8]) -> Result<()> {
    let temp = dir.join(SNAPSHOT_TEMP_FILE_NAME);
    let target = dir.join(SNAPSHOT_FILE_NAME);

    let mut file = File::create(&temp)
        .map_err(DbError::io)
        .wrap_err_with(|| format!("failed to create '{}'", temp.display()))?;
    file.write_all(bytes)
        .map_err(DbError::io)
        .wrap_err("failed to write snapshot")?;
    file.sync_all()
        .map_err(DbError::io)
        .wrap_err("failed to sync snapshot")?;
    drop(file);

    fs::rename(&temp, &target)
        .map_err(DbError::io)
        .wrap_err("failed to install snapshot")?;
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }
    Ok(())
}

/// Reads the snapshot in `dir`, if one exists.
pub fn read_snapshot(dir: &Path) -> Result<Option<SnapshotImage>> {
    let path = dir.join(SNAPSHOT_FILE_NAME);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(DbError::io(e))
                .wrap_err_with(|| format!("failed to read '{}'", path.display()))
        }
    };
    decode_snapshot(&data)
        .wrap_err_with(|| format!("failed to load '{}'", path.display()))
        .map(Some)
}
