//! # Multi-Version Concurrency Control (MVCC)
//!
//! Snapshot isolation for emberdb: readers never block writers, writers never
//! block readers, and write/write conflicts are detected at commit time
//! (first committer wins).
//!
//! ## Version Storage
//!
//! Each row identity owns an append-only chain of committed versions ordered
//! by commit timestamp. An update appends a full row image; a delete appends
//! a deletion marker. Nothing is mutated in place.
//!
//! ```text
//! row 7:  [ts=3 ("Alice", 29)] -> [ts=9 ("Alice", 30)] -> [ts=12 <deleted>]
//!
//! snapshot read_ts=10 sees ("Alice", 30)
//! snapshot read_ts=12 sees nothing
//! snapshot read_ts=2  sees nothing (row did not exist yet)
//! ```
//!
//! ## Transaction Lifecycle
//!
//! ```text
//! begin() ─────> Active ─────> commit() ─────> Committed
//!                  │              │
//!                  │              └── conflict ──> Aborted
//!                  └──> rollback() ───> Aborted
//! ```
//!
//! Uncommitted writes never touch the shared chains. They are staged in the
//! transaction's private `WriteSet` and overlaid onto snapshot reads, so a
//! transaction sees its own writes and nobody else does.
//!
//! ## Visibility Rule
//!
//! The version visible at `read_ts` is the newest one with
//! `commit_ts <= read_ts`. If that version is a deletion marker, or no such
//! version exists, the row is invisible.
//!
//! ## Commit Protocol
//!
//! Under the manager's commit lock:
//! 1. For every row the transaction modified that existed before it, fail
//!    with a conflict if the row's newest commit is later than `read_ts`.
//! 2. Assign `commit_ts = last_commit_ts + 1` and make the change durable.
//! 3. Append versions and index entries, then publish `commit_ts` so new
//!    snapshots observe the commit atomically.
//!
//! ## Garbage Collection
//!
//! The watermark is the oldest `read_ts` among active transactions. For each
//! chain, only the newest version at or below the watermark and everything
//! after it can still be read; older versions are reclaimed.

pub mod transaction;
pub mod version;
pub mod write_set;

pub use transaction::{Snapshot, TransactionManager, TxnState};
pub use version::{RowVersion, VersionChain};
pub use write_set::{PendingWrite, SavePoint, WriteSet};
