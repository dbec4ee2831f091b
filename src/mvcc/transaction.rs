//! # Transaction Management
//!
//! The `TransactionManager` hands out transaction ids and read snapshots,
//! serializes commits, and tracks active snapshots for the garbage
//! collection watermark.
//!
//! ## Identifiers and Timestamps
//!
//! - `TxnId`: unique per transaction, allocated from an atomic counter and
//!   never reused.
//! - `CommitTs`: logical clock advanced by exactly one per successful commit.
//!   A snapshot's `read_ts` is the last published commit timestamp at
//!   `begin`; it sees every commit up to and including it.
//!
//! ## Transaction States
//!
//! ```text
//! ┌─────────┐     commit()     ┌───────────┐
//! │ Active  │ ───────────────> │ Committed │
//! └─────────┘                  └───────────┘
//!      │
//!      │ rollback() / conflict
//!      v
//! ┌─────────┐
//! │ Aborted │
//! └─────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! - `last_commit_ts`: published with a release store after the commit's
//!   versions are in place, read with an acquire load by `begin`.
//! - `commit_lock`: held for validation, durable write and apply, so commit
//!   timestamps are assigned and published in order.
//! - `active`: short mutex around a map of `txn_id -> read_ts`.
//!
//! ## Watermark Calculation
//!
//! The watermark is the minimum `read_ts` among active transactions, or the
//! last commit timestamp when none are active. No snapshot can ever need a
//! version superseded at or before the watermark.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{CommitTs, TxnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxnState {
    #[default]
    Active,
    Committed,
    Aborted,
}

impl TxnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::Aborted => "rolled back",
        }
    }
}

/// The read view of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub txn_id: TxnId,
    pub read_ts: CommitTs,
}

pub struct TransactionManager {
    next_txn_id: AtomicU64,
    last_commit_ts: AtomicU64,
    active: Mutex<BTreeMap<TxnId, CommitTs>>,
    commit_lock: Mutex<()>,
    commits_since_gc: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::with_last_commit(0)
    }

    /// Resumes the commit clock after recovery.
    pub fn with_last_commit(last_commit_ts: CommitTs) -> Self {
        Self {
            next_txn_id: AtomicU64::new(1),
            last_commit_ts: AtomicU64::new(last_commit_ts),
            active: Mutex::new(BTreeMap::new()),
            commit_lock: Mutex::new(()),
            commits_since_gc: AtomicU64::new(0),
        }
    }

    pub fn begin(&self) -> Snapshot {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let mut active = self.active.lock();
        let read_ts = self.last_commit_ts.load(Ordering::Acquire);
        active.insert(txn_id, read_ts);
        Snapshot { txn_id, read_ts }
    }

    /// Unregisters a transaction after commit or rollback.
    pub fn finish(&self, txn_id: TxnId) {
        self.active.lock().remove(&txn_id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn last_commit_ts(&self) -> CommitTs {
        self.last_commit_ts.load(Ordering::Acquire)
    }

    /// Serializes the validate/write/apply section of commits and DDL.
    pub fn commit_guard(&self) -> MutexGuard<'_, ()> {
        self.commit_lock.lock()
    }

    /// Timestamp the next commit will publish. Only meaningful while holding
    /// the commit guard.
    pub fn next_commit_ts(&self) -> CommitTs {
        self.last_commit_ts() + 1
    }

    /// Makes a commit visible to snapshots taken from now on. Returns true
    /// when enough commits have accumulated to run garbage collection.
    pub fn publish(&self, commit_ts: CommitTs, gc_interval: u64) -> bool {
        self.last_commit_ts.store(commit_ts, Ordering::Release);
        let since = self.commits_since_gc.fetch_add(1, Ordering::Relaxed) + 1;
        gc_interval > 0 && since >= gc_interval
    }

    pub fn reset_gc_counter(&self) {
        self.commits_since_gc.store(0, Ordering::Relaxed);
    }

    pub fn watermark(&self) -> CommitTs {
        let active = self.active.lock();
        let oldest = active.values().copied().min();
        let last = self.last_commit_ts();
        oldest.map_or(last, |ts| ts.min(last))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("last_commit_ts", &self.last_commit_ts())
            .field("active", &self.active_count())
            .finish()
    }
}
