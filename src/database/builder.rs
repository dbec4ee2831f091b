//! # Database Builder
//!
//! Fluent configuration for opening a database, as an alternative to a
//! connection string.
//!
//! ```ignore
//! let db = Database::builder()
//!     .path("./data")
//!     .sync_mode(SyncMode::Normal)
//!     .checkpoint_threshold(16 * 1024 * 1024)
//!     .open()?;
//! ```
//!
//! | Option                 | Default   |
//! |------------------------|-----------|
//! | location               | in memory |
//! | `sync_mode`            | `Full`    |
//! | `checkpoint_threshold` | 4 MiB     |
//! | `gc_interval`          | 64 commits|
//! | `hnsw_ef_search`       | 32        |
//! | `vector_index_scan`    | `true`    |

use eyre::Result;
use std::path::Path;

use super::config::{DatabaseConfig, Location, SyncMode};
use super::Database;

#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    location: Location,
    config: DatabaseConfig,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self {
            location: Location::Memory,
            config: DatabaseConfig::default(),
        }
    }

    /// Stores the database in `path`, a directory created if missing.
    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.location = Location::Directory(path.as_ref().to_path_buf());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.location = Location::Memory;
        self
    }

    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    /// WAL size in bytes past which a commit triggers a checkpoint.
    pub fn checkpoint_threshold(mut self, bytes: u64) -> Self {
        self.config.checkpoint_threshold_bytes = bytes;
        self
    }

    /// Commits between automatic garbage collection passes; 0 turns
    /// automatic collection off.
    pub fn gc_interval(mut self, commits: u64) -> Self {
        self.config.gc_interval_commits = commits;
        self
    }

    pub fn hnsw_ef_search(mut self, ef: usize) -> Self {
        self.config.hnsw_ef_search = ef.max(1);
        self
    }

    pub fn vector_index_scan(mut self, enabled: bool) -> Self {
        self.config.vector_index_scan = enabled;
        self
    }

    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    pub fn open(self) -> Result<Database> {
        Database::open_with(self.location, self.config)
    }
}
