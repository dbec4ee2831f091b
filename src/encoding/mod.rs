//! # Encoding Module
//!
//! Byte-level encodings used by the engine:
//!
//! - **Key encoding**: big-endian, byte-comparable keys for ordered indexes
//! - **Record encoding**: compact row images for the WAL and snapshot files

pub mod key;
pub mod record;

pub use key::{encode_key, encode_value_to, type_prefix};
pub use record::{put_bytes, put_u32, put_u64, ByteReader, RecordCodec};
