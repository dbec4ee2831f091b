//! # emberdb Configuration Module
//!
//! Centralizes the engine's tunable defaults and on-disk identifiers. Values
//! that depend on each other are co-located and checked with compile-time
//! assertions so a change to one cannot silently break another.
//!
//! ## Module Organization
//!
//! - [`constants`]: numeric defaults, file names and format magic
//!
//! Per-database runtime settings (`DatabaseConfig`, `SyncMode`) live in
//! `database::config`; the values here are only their defaults.

pub mod constants;
pub use constants::*;
