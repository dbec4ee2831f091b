//! # Row Record Encoding
//!
//! Compact row images written to the WAL and the snapshot file. Unlike
//! `encoding/key.rs` this format does not preserve order; it is optimized for
//! space and a single decoding pass.
//!
//! ```text
//! Row    := [col_count: u16] [Column]*
//! Column := [discriminant: u8] [Data]
//!
//! Discriminants:
//!   0x01 = NULL       (no data)
//!   0x02 = FALSE      (no data)
//!   0x03 = TRUE       (no data)
//!   0x14 = ZERO       (no data, Integer(0))
//!   0x16 = INTEGER    (8 bytes big-endian i64)
//!   0x15 = FLOAT      (8 bytes f64 bits)
//!   0x20 = TEXT       ([len: u32] [utf8_bytes])
//!   0x32 = TIMESTAMP  (8 bytes: micros since epoch, UTC)
//!   0x50 = JSON       ([len: u32] [utf8_bytes])
//!   0x70 = VECTOR     ([count: u32] [f32 * count])
//! ```
//!
//! `ByteReader` is the matching bounds-checked cursor. Every read checks the
//! remaining length first and fails with a corruption error instead of
//! panicking on truncated input.

use chrono::{DateTime, Utc};
use eyre::Result;

use crate::error::DbError;
use crate::types::Value;

mod discriminant {
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const ZERO: u8 = 0x14;
    pub const FLOAT: u8 = 0x15;
    pub const INTEGER: u8 = 0x16;
    pub const TEXT: u8 = 0x20;
    pub const TIMESTAMP: u8 = 0x32;
    pub const JSON: u8 = 0x50;
    pub const VECTOR: u8 = 0x70;
}

pub struct RecordCodec;

impl RecordCodec {
    pub fn encode_row_into(row: &[Value], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(row.len() as u16).to_be_bytes());
        for value in row {
            Self::encode_value_into(value, buf);
        }
    }

    fn encode_value_into(value: &Value, buf: &mut Vec<u8>) {
        match value {
            Value::Null => buf.push(discriminant::NULL),
            Value::Boolean(false) => buf.push(discriminant::FALSE),
            Value::Boolean(true) => buf.push(discriminant::TRUE),
            Value::Integer(0) => buf.push(discriminant::ZERO),
            Value::Integer(i) => {
                buf.push(discriminant::INTEGER);
                buf.extend_from_slice(&i.to_be_bytes());
            }
            Value::Float(f) => {
                buf.push(discriminant::FLOAT);
                buf.extend_from_slice(&f.to_bits().to_be_bytes());
            }
            Value::Text(s) => {
                buf.push(discriminant::TEXT);
                put_bytes(buf, s.as_bytes());
            }
            Value::Timestamp(ts) => {
                buf.push(discriminant::TIMESTAMP);
                buf.extend_from_slice(&ts.timestamp_micros().to_be_bytes());
            }
            Value::Json(s) => {
                buf.push(discriminant::JSON);
                put_bytes(buf, s.as_bytes());
            }
            Value::Vector(v) => {
                buf.push(discriminant::VECTOR);
                buf.extend_from_slice(&(v.len() as u32).to_be_bytes());
                for component in v {
                    buf.extend_from_slice(&component.to_le_bytes());
                }
            }
        }
    }

    pub fn decode_row(reader: &mut ByteReader<'_>) -> Result<Vec<Value>> {
        let col_count = reader.read_u16()? as usize;
        let mut row = Vec::with_capacity(col_count);
        for _ in 0..col_count {
            row.push(Self::decode_value(reader)?);
        }
        Ok(row)
    }

    fn decode_value(reader: &mut ByteReader<'_>) -> Result<Value> {
        let disc = reader.read_u8()?;
        match disc {
            discriminant::NULL => Ok(Value::Null),
            discriminant::FALSE => Ok(Value::Boolean(false)),
            discriminant::TRUE => Ok(Value::Boolean(true)),
            discriminant::ZERO => Ok(Value::Integer(0)),
            discriminant::INTEGER => Ok(Value::Integer(reader.read_u64()? as i64)),
            discriminant::FLOAT => Ok(Value::Float(f64::from_bits(reader.read_u64()?))),
            discriminant::TEXT => Ok(Value::Text(reader.read_string()?)),
            discriminant::TIMESTAMP => {
                let micros = reader.read_u64()? as i64;
                let ts = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
                    DbError::corruption(format!("timestamp out of range: {} micros", micros))
                })?;
                Ok(Value::Timestamp(ts))
            }
            discriminant::JSON => Ok(Value::Json(reader.read_string()?)),
            discriminant::VECTOR => {
                let count = reader.read_u32()? as usize;
                let bytes = reader.read_slice(count * 4)?;
                let vector = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Ok(Value::Vector(vector))
            }
            other => Err(DbError::corruption(format!(
                "unknown value discriminant 0x{:02x}",
                other
            ))),
        }
    }
}

pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

pub fn put_u64(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, n: u32) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(DbError::corruption(format!(
                "truncated record: need {} bytes at offset {}, have {}",
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_slice(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_slice(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_slice(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(b);
        Ok(u64::from_be_bytes(bytes))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.read_slice(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DbError::corruption(format!("invalid utf-8 in record: {}", e)))
    }
}
