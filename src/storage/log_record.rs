//! # Log Records
//!
//! Payloads carried by WAL frames. DDL records are JSON so table and index
//! definitions evolve with their serde derives; commit records are binary
//! and reuse the row codec.
//!
//! ## Commit Payload
//!
//! ```text
//! commit_ts u64 | change_count u32 | change*
//! change: table_id u64 | row_id u64 | present u8 | row (RecordCodec, if present)
//! ```
//!
//! A change without a row is a deletion marker.

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::encoding::{put_u32, put_u64, ByteReader, RecordCodec};
use crate::error::DbError;
use crate::schema::{IndexDef, TableDef};
use crate::types::{CommitTs, RowId, Value};

pub const KIND_DDL: u32 = 1;
pub const KIND_COMMIT: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DdlRecord {
    CreateTable(TableDef),
    DropTable { table_id: u64 },
    CreateIndex { table_id: u64, index: IndexDef },
    DropIndex { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub table_id: u64,
    pub row_id: RowId,
    pub data: Option<Arc<[Value]>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Ddl(DdlRecord),
    Commit {
        commit_ts: CommitTs,
        changes: Vec<RowChange>,
    },
}

impl LogRecord {
    /// Serializes the record, returning its frame kind and payload.
    pub fn encode(&self) -> Result<(u32, Vec<u8>)> {
        match self {
            LogRecord::Ddl(ddl) => {
                let payload =
                    serde_json::to_vec(ddl).wrap_err("failed to serialize DDL log record")?;
                Ok((KIND_DDL, payload))
            }
            LogRecord::Commit { commit_ts, changes } => {
                let mut buf = Vec::with_capacity(16 + changes.len() * 32);
                put_u64(&mut buf, *commit_ts);
                put_u32(&mut buf, changes.len() as u32);
                for change in changes {
                    put_u64(&mut buf, change.table_id);
                    put_u64(&mut buf, change.row_id);
                    match &change.data {
                        Some(row) => {
                            buf.push(1);
                            RecordCodec::encode_row_into(row, &mut buf);
                        }
                        None => buf.push(0),
                    }
                }
                Ok((KIND_COMMIT, buf))
            }
        }
    }

    pub fn decode(kind: u32, payload: &[u8]) -> Result<Self> {
        match kind {
            KIND_DDL => {
                let ddl: DdlRecord = serde_json::from_slice(payload)
                    .map_err(|e| DbError::corruption(format!("malformed DDL log record: {}", e)))?;
                Ok(LogRecord::Ddl(ddl))
            }
            KIND_COMMIT => {
                let mut reader = ByteReader::new(payload);
                let commit_ts = reader.read_u64()?;
                let count = reader.read_u32()? as usize;
                let mut changes = Vec::with_capacity(count.min(reader.remaining() / 17 + 1));
                for _ in 0..count {
                    let table_id = reader.read_u64()?;
                    let row_id = reader.read_u64()?;
                    let data = match reader.read_u8()? {
                        0 => None,
                        1 => Some(Arc::from(RecordCodec::decode_row(&mut reader)?)),
                        flag => {
                            return Err(DbError::corruption(format!(
                                "invalid row presence flag {:#04x}",
                                flag
                            )))
                        }
                    };
                    changes.push(RowChange {
                        table_id,
                        row_id,
                        data,
                    });
                }
                if !reader.is_empty() {
                    return Err(DbError::corruption("trailing bytes in commit log record"));
                }
                Ok(LogRecord::Commit { commit_ts, changes })
            }
            other => Err(DbError::corruption(format!("unknown log record kind {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{ColumnDef, Constraint};
    use crate::types::DataType;

    #[test]
    fn commit_record_keeps_deletions_and_rows() {
        let record = LogRecord::Commit {
            commit_ts: 42,
            changes: vec![
                RowChange {
                    table_id: 1,
                    row_id: 7,
                    data: Some(Arc::from(vec![
                        Value::Integer(1),
                        Value::Text("x".into()),
                        Value::Vector(vec![0.5, 1.5]),
                    ])),
                },
                RowChange {
                    table_id: 1,
                    row_id: 8,
                    data: None,
                },
            ],
        };

        let (kind, payload) = record.encode().unwrap();
        assert_eq!(kind, KIND_COMMIT);
        assert_eq!(LogRecord::decode(kind, &payload).unwrap(), record);
    }

    #[test]
    fn ddl_record_carries_table_definition() {
        let table = TableDef::new(
            3,
            "docs",
            vec![
                ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                ColumnDef::new("embedding", DataType::Vector(4)),
            ],
        )
        .unwrap();
        let record = LogRecord::Ddl(DdlRecord::CreateTable(table.clone()));

        let (kind, payload) = record.encode().unwrap();
        match LogRecord::decode(kind, &payload).unwrap() {
            LogRecord::Ddl(DdlRecord::CreateTable(decoded)) => {
                assert_eq!(decoded, table);
                assert_eq!(decoded.id(), 3);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn garbage_payload_is_corruption() {
        let err = LogRecord::decode(KIND_COMMIT, &[1, 2, 3]).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Corruption));

        let err = LogRecord::decode(99, &[]).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Corruption));
    }
}
