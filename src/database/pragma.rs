//! # PRAGMA Statements
//!
//! Runtime settings and maintenance commands. Every PRAGMA returns one row
//! with one column named after the pragma, holding its current (or
//! resulting) value.
//!
//! | PRAGMA | Effect |
//! |--------|--------|
//! | `synchronous [= OFF\|NORMAL\|FULL]` | WAL sync mode for later commits |
//! | `wal_checkpoint` | snapshot + WAL truncation; returns WAL bytes folded in |
//! | `wal_size` | current WAL length in bytes |
//! | `hnsw_ef_search [= n]` | candidate list size for HNSW searches |
//! | `vector_index_scan [= ON\|OFF]` | OFF forces exact vector scans |
//! | `gc` | garbage-collects versions now; returns the count reclaimed |
//!
//! Settings apply to the whole database, not just the issuing handle.
//! Changing a plan setting invalidates cached prepared-statement plans.

use eyre::Result;

use super::database::SharedDatabase;
use super::row::QueryResult;
use super::SyncMode;
use crate::types::Value;

impl SharedDatabase {
    pub(crate) fn execute_pragma(&self, name: &str, value: Option<&str>) -> Result<QueryResult> {
        let name = name.to_ascii_lowercase();
        let value = value.map(str::trim);

        let current = match name.as_str() {
            "synchronous" => self.pragma_synchronous(value)?,
            "wal_checkpoint" => self.pragma_wal_checkpoint(value)?,
            "wal_size" => self.pragma_read_only(&name, value, |db| {
                Value::Integer(db.wal_size() as i64)
            })?,
            "hnsw_ef_search" => self.pragma_ef_search(value)?,
            "vector_index_scan" => self.pragma_vector_index_scan(value)?,
            "gc" => {
                if value.is_some() {
                    schema_bail!("PRAGMA gc does not take a value");
                }
                Value::Integer(self.collect_garbage()? as i64)
            }
            _ => schema_bail!("unknown PRAGMA: {}", name),
        };

        Ok(QueryResult {
            columns: vec![name],
            rows: vec![vec![current]],
        })
    }

    fn pragma_read_only(
        &self,
        name: &str,
        value: Option<&str>,
        read: impl FnOnce(&Self) -> Value,
    ) -> Result<Value> {
        if value.is_some() {
            schema_bail!("PRAGMA {} is read-only", name);
        }
        Ok(read(self))
    }

    fn pragma_synchronous(&self, value: Option<&str>) -> Result<Value> {
        if let Some(value) = value {
            let mode: SyncMode = value.parse()?;
            self.config.write().sync_mode = mode;
            if let Some(durability) = &self.durability {
                durability.lock().set_sync_mode(mode);
            }
        }
        Ok(Value::Text(self.config.read().sync_mode.to_string()))
    }

    fn pragma_wal_checkpoint(&self, value: Option<&str>) -> Result<Value> {
        if value.is_some() {
            schema_bail!("PRAGMA wal_checkpoint does not take a value");
        }
        let folded = self.wal_size();
        self.checkpoint()?;
        Ok(Value::Integer(folded as i64))
    }

    fn pragma_ef_search(&self, value: Option<&str>) -> Result<Value> {
        if let Some(value) = value {
            let ef = match value.parse::<usize>() {
                Ok(ef) if ef > 0 => ef,
                _ => schema_bail!("hnsw_ef_search must be a positive integer, got '{}'", value),
            };
            self.config.write().hnsw_ef_search = ef;
        }
        Ok(Value::Integer(self.config.read().hnsw_ef_search as i64))
    }

    fn pragma_vector_index_scan(&self, value: Option<&str>) -> Result<Value> {
        if let Some(value) = value {
            let enabled = match value.to_ascii_uppercase().as_str() {
                "ON" | "TRUE" | "1" => true,
                "OFF" | "FALSE" | "0" => false,
                _ => schema_bail!("vector_index_scan expects ON or OFF, got '{}'", value),
            };
            self.config.write().vector_index_scan = enabled;
        }
        let enabled = self.config.read().vector_index_scan;
        Ok(Value::Text(if enabled { "ON" } else { "OFF" }.to_string()))
    }
}
