//! # emberdb Configuration Constants
//!
//! ```text
//! HNSW_DEFAULT_M (16)
//!       │
//!       ├─> HNSW_DEFAULT_M0 (2 * M, layer 0 fan-out)
//!       │
//!       └─> HNSW_MAX_LEVEL (15, cap on randomly drawn levels)
//!
//! HNSW_DEFAULT_EF_CONSTRUCTION (100)
//!       └─> must be >= M, or neighbor selection starves
//!
//! WAL_FRAME_HEADER_SIZE (32 bytes)
//!       └─> fixed header in front of every WAL payload
//!
//! DEFAULT_CHECKPOINT_THRESHOLD_BYTES (4 MiB)
//!       └─> WAL size at which a commit triggers a checkpoint
//! ```

// ============================================================================
// FILE LAYOUT
// ============================================================================

/// Snapshot file inside a database directory.
pub const SNAPSHOT_FILE_NAME: &str = "snapshot.edb";

/// Temporary name the snapshot is written under before the atomic rename.
pub const SNAPSHOT_TEMP_FILE_NAME: &str = "snapshot.edb.tmp";

/// Write-ahead log inside a database directory.
pub const WAL_FILE_NAME: &str = "wal.log";

/// Leading bytes of a snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"EMBERSN1";

/// Snapshot format version written after the magic.
pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// WAL CONFIGURATION
// ============================================================================

/// Size of the WAL frame header in bytes.
/// Each frame header holds: lsn, payload length, record kind, checksum.
pub const WAL_FRAME_HEADER_SIZE: usize = 32;

/// Upper bound on a single frame payload. A header claiming more than this
/// is treated as a torn tail rather than allocated.
pub const MAX_WAL_PAYLOAD_SIZE: u64 = 1 << 30;

/// WAL size in bytes that triggers an automatic checkpoint after a commit.
pub const DEFAULT_CHECKPOINT_THRESHOLD_BYTES: u64 = 4 * 1024 * 1024;

/// Size of the buffered writer used in `SyncMode::Off`.
pub const WAL_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// MVCC CONFIGURATION
// ============================================================================

/// Number of commits between automatic version garbage collection passes.
pub const DEFAULT_GC_INTERVAL_COMMITS: u64 = 64;

/// Version chains rarely exceed this many entries between GC passes.
pub const INLINE_VERSIONS: usize = 2;

// ============================================================================
// HNSW CONFIGURATION
// ============================================================================

/// Maximum neighbors per node on layers above 0.
pub const HNSW_DEFAULT_M: usize = 16;

/// Maximum neighbors per node on layer 0.
pub const HNSW_DEFAULT_M0: usize = HNSW_DEFAULT_M * 2;

/// Beam width used while inserting.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 100;

/// Beam width used while searching. Always raised to at least `k`.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 32;

/// Hard cap on the level drawn for a new node.
pub const HNSW_MAX_LEVEL: usize = 15;

const _: () = assert!(
    HNSW_DEFAULT_EF_CONSTRUCTION >= HNSW_DEFAULT_M,
    "ef_construction must be >= M"
);

const _: () = assert!(
    HNSW_DEFAULT_M0 >= HNSW_DEFAULT_M,
    "layer 0 fan-out must be at least M"
);
