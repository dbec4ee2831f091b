//! # Write-Ahead Log
//!
//! Append-only log of checksummed frames. Every DDL statement and every
//! committed transaction becomes exactly one frame; replaying the frames in
//! LSN order on top of the last snapshot reproduces the committed state.
//!
//! ## Frame Format
//!
//! ```text
//! +------------------------+---------------------------+
//! | Frame Header (32 B)    | Payload (payload_len B)   |
//! +------------------------+---------------------------+
//!
//! header: lsn u64 | payload_len u32 | kind u32 | checksum u64 | reserved [u8; 8]
//! ```
//!
//! `checksum` is CRC-64/ECMA-182 over `lsn`, `payload_len`, `kind` and the
//! payload. A frame whose header is short, whose payload is short, or whose
//! checksum does not match marks the end of the log.
//!
//! ## Sync Modes
//!
//! | Mode | On append | On `sync()` |
//! |------|-----------|-------------|
//! | `Full` | write + fsync | fsync |
//! | `Normal` | write to the OS | fsync |
//! | `Off` | buffer in memory (flushed past `WAL_BUFFER_SIZE`) | write + fsync |
//!
//! ## Failure Handling
//!
//! An append that fails part way truncates the file back to the last frame
//! boundary, so a later append never lands behind a torn frame.
//!
//! ## Recovery
//!
//! `Wal::scan` reads every intact frame and reports where the valid prefix
//! ends. `Wal::open` truncates anything past that point before appending.

use crc::{Crc, CRC_64_ECMA_182};
use eyre::{Result, WrapErr};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::config::{MAX_WAL_PAYLOAD_SIZE, WAL_BUFFER_SIZE, WAL_FRAME_HEADER_SIZE};
use crate::database::SyncMode;
use crate::error::DbError;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, Immutable)]
pub struct WalFrameHeader {
    pub lsn: u64,
    pub payload_len: u32,
    pub kind: u32,
    pub checksum: u64,
    _reserved: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<WalFrameHeader>() == WAL_FRAME_HEADER_SIZE);

impl WalFrameHeader {
    pub fn new(lsn: u64, kind: u32, payload: &[u8]) -> Self {
        let mut header = Self {
            lsn,
            payload_len: payload.len() as u32,
            kind,
            checksum: 0,
            _reserved: [0; 8],
        };
        header.checksum = compute_checksum(&header, payload);
        header
    }
}

pub fn compute_checksum(header: &WalFrameHeader, payload: &[u8]) -> u64 {
    let mut digest = CRC64.digest();

    digest.update(&header.lsn.to_le_bytes());
    digest.update(&header.payload_len.to_le_bytes());
    digest.update(&header.kind.to_le_bytes());

    digest.update(payload);

    digest.finalize()
}

pub fn validate_checksum(header: &WalFrameHeader, payload: &[u8]) -> bool {
    compute_checksum(header, payload) == header.checksum
}

/// One intact frame read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalFrame {
    pub lsn: u64,
    pub kind: u32,
    pub payload: Vec<u8>,
}

/// Result of scanning a log file from the start.
#[derive(Debug, Default)]
pub struct WalScan {
    pub frames: Vec<WalFrame>,
    /// Byte length of the intact prefix.
    pub valid_len: u64,
    /// Bytes past the intact prefix that will be discarded.
    pub torn_bytes: u64,
}

pub struct Wal {
    path: PathBuf,
    file: File,
    sync_mode: SyncMode,
    next_lsn: u64,
    /// Bytes known to be written to the file.
    written: u64,
    pending: Vec<u8>,
}

impl Wal {
    /// Reads every intact frame of the log at `path`. A missing file is an
    /// empty log.
    pub fn scan(path: &Path) -> Result<WalScan> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WalScan::default()),
            Err(e) => {
                return Err(DbError::io(e))
                    .wrap_err_with(|| format!("failed to open WAL '{}'", path.display()))
            }
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(DbError::io)
            .wrap_err_with(|| format!("failed to read WAL '{}'", path.display()))?;

        let mut scan = WalScan::default();
        let mut offset = 0usize;
        let mut last_lsn = 0u64;

        while data.len() - offset >= WAL_FRAME_HEADER_SIZE {
            let Ok(header) =
                WalFrameHeader::read_from_bytes(&data[offset..offset + WAL_FRAME_HEADER_SIZE])
            else {
                break;
            };
            let payload_len = header.payload_len as usize;
            let start = offset + WAL_FRAME_HEADER_SIZE;
            if header.payload_len as u64 > MAX_WAL_PAYLOAD_SIZE || data.len() - start < payload_len {
                break;
            }
            let payload = &data[start..start + payload_len];
            if !validate_checksum(&header, payload) || header.lsn <= last_lsn {
                break;
            }

            last_lsn = header.lsn;
            scan.frames.push(WalFrame {
                lsn: header.lsn,
                kind: header.kind,
                payload: payload.to_vec(),
            });
            offset = start + payload_len;
        }

        scan.valid_len = offset as u64;
        scan.torn_bytes = (data.len() - offset) as u64;
        Ok(scan)
    }

    /// Opens the log for appending, discarding bytes past `valid_len`.
    pub fn open(path: &Path, valid_len: u64, next_lsn: u64, sync_mode: SyncMode) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(DbError::io)
            .wrap_err_with(|| format!("failed to open WAL '{}'", path.display()))?;

        let len = file.metadata().map_err(DbError::io)?.len();
        if len > valid_len {
            warn!(
                path = %path.display(),
                discarded = len - valid_len,
                "truncating torn WAL tail"
            );
            file.set_len(valid_len)
                .map_err(DbError::io)
                .wrap_err("failed to truncate torn WAL tail")?;
            file.sync_all().map_err(DbError::io)?;
        }
        file.seek(SeekFrom::Start(valid_len)).map_err(DbError::io)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            sync_mode,
            next_lsn: next_lsn.max(1),
            written: valid_len,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn set_sync_mode(&mut self, sync_mode: SyncMode) {
        self.sync_mode = sync_mode;
    }

    /// LSN the next appended frame will carry.
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Size of the log including buffered frames.
    pub fn size(&self) -> u64 {
        self.written + self.pending.len() as u64
    }

    pub fn needs_checkpoint(&self, threshold_bytes: u64) -> bool {
        self.size() >= threshold_bytes
    }

    /// Appends one frame and makes it as durable as the sync mode demands.
    /// Returns the frame's LSN.
    pub fn append(&mut self, kind: u32, payload: &[u8]) -> Result<u64> {
        eyre::ensure!(
            payload.len() as u64 <= MAX_WAL_PAYLOAD_SIZE,
            "WAL payload of {} bytes exceeds the frame limit",
            payload.len()
        );

        let lsn = self.next_lsn;
        let header = WalFrameHeader::new(lsn, kind, payload);
        let mark = self.pending.len();
        let frame_offset = self.written + mark as u64;
        self.pending.extend_from_slice(header.as_bytes());
        self.pending.extend_from_slice(payload);

        let result = match self.sync_mode {
            SyncMode::Full => self.flush_pending(true),
            SyncMode::Normal => self.flush_pending(false),
            SyncMode::Off if self.pending.len() >= WAL_BUFFER_SIZE => self.flush_pending(false),
            SyncMode::Off => Ok(()),
        };

        if let Err(e) = result {
            if self.written > frame_offset {
                self.rewind_to(frame_offset);
            } else {
                self.pending.truncate(mark);
            }
            return Err(e).wrap_err_with(|| format!("failed to append WAL frame {}", lsn));
        }

        self.next_lsn += 1;
        Ok(lsn)
    }

    fn flush_pending(&mut self, fsync: bool) -> Result<()> {
        if !self.pending.is_empty() {
            if let Err(e) = self.file.write_all(&self.pending) {
                self.pending.clear();
                let written = self.written;
                self.rewind_to(written);
                return Err(DbError::io(e));
            }
            self.written += self.pending.len() as u64;
            self.pending.clear();
        }
        if fsync {
            self.file.sync_data().map_err(DbError::io)?;
        }
        Ok(())
    }

    /// Cuts the file back to `offset` so it ends on a frame boundary.
    fn rewind_to(&mut self, offset: u64) {
        self.pending.clear();
        self.written = offset;
        if self.file.set_len(offset).is_err() || self.file.seek(SeekFrom::Start(offset)).is_err() {
            warn!(path = %self.path.display(), offset, "could not rewind WAL after failed write");
        }
    }

    /// Writes buffered frames and fsyncs the file.
    pub fn sync(&mut self) -> Result<()> {
        self.flush_pending(true)
            .wrap_err_with(|| format!("failed to sync WAL '{}'", self.path.display()))
    }

    /// Empties the log after its contents were captured by a snapshot.
    /// LSNs keep increasing across truncation.
    pub fn truncate(&mut self) -> Result<()> {
        self.pending.clear();
        self.file
            .set_len(0)
            .map_err(DbError::io)
            .wrap_err("failed to truncate WAL")?;
        self.file.seek(SeekFrom::Start(0)).map_err(DbError::io)?;
        self.file.sync_all().map_err(DbError::io)?;

        debug!(path = %self.path.display(), bytes = self.written, "WAL truncated");
        self.written = 0;
        Ok(())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .field("next_lsn", &self.next_lsn)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_fresh(path: &Path, mode: SyncMode) -> Wal {
        let scan = Wal::scan(path).unwrap();
        let next = scan.frames.last().map_or(1, |f| f.lsn + 1);
        Wal::open(path, scan.valid_len, next, mode).unwrap()
    }

    #[test]
    fn header_is_32_bytes() {
        assert_eq!(std::mem::size_of::<WalFrameHeader>(), 32);
    }

    #[test]
    fn header_checksum_covers_payload() {
        let header = WalFrameHeader::new(7, 5, b"payload");
        assert!(validate_checksum(&header, b"payload"));
        assert!(!validate_checksum(&header, b"pay1oad"));

        let parsed = WalFrameHeader::read_from_bytes(header.as_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn frames_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = open_fresh(&path, SyncMode::Full);
        assert_eq!(wal.append(1, b"one").unwrap(), 1);
        assert_eq!(wal.append(5, b"two").unwrap(), 2);
        drop(wal);

        let scan = Wal::scan(&path).unwrap();
        assert_eq!(scan.frames.len(), 2);
        assert_eq!(scan.frames[1].payload, b"two");
        assert_eq!(scan.frames[1].kind, 5);
        assert_eq!(scan.torn_bytes, 0);
    }

    #[test]
    fn torn_tail_is_detected_and_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = open_fresh(&path, SyncMode::Full);
        wal.append(1, b"kept").unwrap();
        let good_len = wal.size();
        wal.append(1, b"this frame gets torn").unwrap();
        drop(wal);

        let full = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(full - 3).unwrap();
        drop(file);

        let scan = Wal::scan(&path).unwrap();
        assert_eq!(scan.frames.len(), 1);
        assert_eq!(scan.valid_len, good_len);
        assert!(scan.torn_bytes > 0);

        let mut wal = Wal::open(&path, scan.valid_len, 2, SyncMode::Full).unwrap();
        wal.append(1, b"after").unwrap();
        drop(wal);

        let rescan = Wal::scan(&path).unwrap();
        let payloads: Vec<_> = rescan.frames.iter().map(|f| f.payload.clone()).collect();
        assert_eq!(payloads, vec![b"kept".to_vec(), b"after".to_vec()]);
    }

    #[test]
    fn corrupted_payload_ends_the_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = open_fresh(&path, SyncMode::Full);
        wal.append(1, b"first").unwrap();
        wal.append(1, b"second").unwrap();
        drop(wal);

        let mut data = std::fs::read(&path).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        std::fs::write(&path, &data).unwrap();

        let scan = Wal::scan(&path).unwrap();
        assert_eq!(scan.frames.len(), 1);
    }

    #[test]
    fn off_mode_buffers_until_sync() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = open_fresh(&path, SyncMode::Off);
        wal.append(1, b"buffered").unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(wal.size() > 0);

        wal.sync().unwrap();
        assert_eq!(Wal::scan(&path).unwrap().frames.len(), 1);
    }

    #[test]
    fn truncate_keeps_lsn_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = open_fresh(&path, SyncMode::Normal);
        wal.append(1, b"a").unwrap();
        wal.truncate().unwrap();
        assert_eq!(wal.size(), 0);
        assert_eq!(wal.append(1, b"b").unwrap(), 2);
    }

    #[test]
    fn missing_file_scans_empty() {
        let dir = tempdir().unwrap();
        let scan = Wal::scan(&dir.path().join("absent.log")).unwrap();
        assert!(scan.frames.is_empty());
        assert_eq!(scan.valid_len, 0);
    }
}
