//! # History File
//!
//! REPL history lives in `~/.emberdb_history` unless `EMBERDB_HISTORY`
//! names another file. An empty `EMBERDB_HISTORY` disables persistence.

use std::env;
use std::path::PathBuf;

const DEFAULT_HISTORY_FILE: &str = ".emberdb_history";
const HISTORY_ENV_VAR: &str = "EMBERDB_HISTORY";

pub fn history_path() -> Option<PathBuf> {
    resolve(env::var(HISTORY_ENV_VAR).ok(), env::var("HOME").ok())
}

fn resolve(custom: Option<String>, home: Option<String>) -> Option<PathBuf> {
    match custom {
        Some(path) if path.is_empty() => None,
        Some(path) => Some(PathBuf::from(path)),
        None => home.map(|home| PathBuf::from(home).join(DEFAULT_HISTORY_FILE)),
    }
}
