//! # Database Configuration
//!
//! Runtime settings for one open database and the connection-string
//! (DSN) syntax that selects them.
//!
//! ## DSN Syntax
//!
//! ```text
//! ""  | ":memory:" | "memory://"        in-memory database
//! "file://<dir>"  | "<dir>"             directory-backed database
//! ...?sync=off|normal|full&checkpoint_threshold=<bytes>
//! ```
//!
//! Options are accepted on in-memory DSNs too, where they have no effect
//! on durability. An unknown option or a malformed value is rejected.
//!
//! ## Defaults
//!
//! | Setting                      | Default  |
//! |------------------------------|----------|
//! | `sync_mode`                  | `Full`   |
//! | `checkpoint_threshold_bytes` | 4 MiB    |
//! | `gc_interval_commits`        | 64       |
//! | `hnsw_ef_search`             | 32       |
//! | `vector_index_scan`          | `true`   |

use eyre::{bail, Result, WrapErr};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::constants::{
    DEFAULT_CHECKPOINT_THRESHOLD_BYTES, DEFAULT_GC_INTERVAL_COMMITS, HNSW_DEFAULT_EF_SEARCH,
};
use crate::sql::planner::PlanSettings;

/// How hard a commit pushes its WAL frame toward stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Frames are buffered in memory and written at checkpoint and close.
    Off,
    /// Frames are handed to the OS on every commit without fsync.
    Normal,
    /// Every commit frame is written and fsynced before the commit returns.
    #[default]
    Full,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Off => "OFF",
            SyncMode::Normal => "NORMAL",
            SyncMode::Full => "FULL",
        }
    }
}

impl FromStr for SyncMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OFF" | "0" => Ok(SyncMode::Off),
            "NORMAL" | "1" => Ok(SyncMode::Normal),
            "FULL" | "2" => Ok(SyncMode::Full),
            _ => bail!("invalid sync mode '{}' (expected OFF, NORMAL or FULL)", s),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub sync_mode: SyncMode,
    pub checkpoint_threshold_bytes: u64,
    /// Commits between automatic garbage collection passes; 0 disables it.
    pub gc_interval_commits: u64,
    pub hnsw_ef_search: usize,
    /// When false, vector searches always scan exactly.
    pub vector_index_scan: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            checkpoint_threshold_bytes: DEFAULT_CHECKPOINT_THRESHOLD_BYTES,
            gc_interval_commits: DEFAULT_GC_INTERVAL_COMMITS,
            hnsw_ef_search: HNSW_DEFAULT_EF_SEARCH,
            vector_index_scan: true,
        }
    }
}

impl DatabaseConfig {
    pub(crate) fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            ef_search: self.hnsw_ef_search,
            vector_index_scan: self.vector_index_scan,
        }
    }
}

/// Where a database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    Directory(PathBuf),
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub location: Location,
    pub config: DatabaseConfig,
}

impl Dsn {
    pub fn parse(dsn: &str) -> Result<Self> {
        let dsn = dsn.trim();
        let (target, query) = match dsn.split_once('?') {
            Some((target, query)) => (target, Some(query)),
            None => (dsn, None),
        };

        let location = match target {
            "" | ":memory:" | "memory://" => Location::Memory,
            other => {
                let path = other.strip_prefix("file://").unwrap_or(other);
                if path.is_empty() {
                    bail!("connection string '{}' has an empty path", dsn);
                }
                Location::Directory(PathBuf::from(path))
            }
        };

        let mut config = DatabaseConfig::default();
        for option in query.into_iter().flat_map(|q| q.split('&')) {
            if option.is_empty() {
                continue;
            }
            let Some((key, value)) = option.split_once('=') else {
                bail!("connection option '{}' is missing a value", option);
            };
            match key.to_ascii_lowercase().as_str() {
                "sync" | "synchronous" => {
                    config.sync_mode = value.parse()?;
                }
                "checkpoint_threshold" => {
                    config.checkpoint_threshold_bytes = value
                        .parse()
                        .wrap_err_with(|| format!("invalid checkpoint_threshold '{}'", value))?;
                }
                _ => bail!("unknown connection option '{}'", key),
            }
        }

        Ok(Self { location, config })
    }
}
