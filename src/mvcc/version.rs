//! # Version Chain Management
//!
//! A `VersionChain` holds every retained committed version of one row,
//! oldest first. Chains are short in practice (one or two versions between
//! garbage collection passes), so they are stored inline in a `SmallVec`.

use smallvec::SmallVec;
use std::sync::Arc;

use crate::config::INLINE_VERSIONS;
use crate::types::{CommitTs, TxnId, Value};

#[derive(Debug, Clone)]
pub struct RowVersion {
    pub commit_ts: CommitTs,
    pub txn_id: TxnId,
    /// `None` is a deletion marker.
    pub data: Option<Arc<[Value]>>,
}

impl RowVersion {
    pub fn is_deleted(&self) -> bool {
        self.data.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionChain {
    versions: SmallVec<[RowVersion; INLINE_VERSIONS]>,
}

impl VersionChain {
    pub fn new(version: RowVersion) -> Self {
        let mut versions = SmallVec::new();
        versions.push(version);
        Self { versions }
    }

    /// Appends a newer version. Commit timestamps only grow.
    pub fn push(&mut self, version: RowVersion) {
        debug_assert!(self.latest_ts() <= version.commit_ts);
        self.versions.push(version);
    }

    pub fn latest(&self) -> Option<&RowVersion> {
        self.versions.last()
    }

    pub fn latest_ts(&self) -> CommitTs {
        self.versions.last().map(|v| v.commit_ts).unwrap_or(0)
    }

    /// Newest row image, or `None` if the row's latest state is deleted.
    pub fn latest_data(&self) -> Option<&Arc<[Value]>> {
        self.latest().and_then(|v| v.data.as_ref())
    }

    pub fn visible(&self, read_ts: CommitTs) -> Option<&RowVersion> {
        self.versions.iter().rev().find(|v| v.commit_ts <= read_ts)
    }

    /// Row image visible at `read_ts`.
    pub fn visible_data(&self, read_ts: CommitTs) -> Option<&Arc<[Value]>> {
        self.visible(read_ts).and_then(|v| v.data.as_ref())
    }

    pub fn versions(&self) -> impl Iterator<Item = &RowVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Drops versions no snapshot at or after `watermark` can read and
    /// returns them. The chain becomes empty when the surviving base version
    /// is a deletion marker with nothing newer.
    pub fn collect_garbage(&mut self, watermark: CommitTs) -> Vec<RowVersion> {
        let base = self.versions.iter().rposition(|v| v.commit_ts <= watermark);
        let Some(base) = base else {
            return Vec::new();
        };

        let mut removed: Vec<RowVersion> = self.versions.drain(..base).collect();

        let only_marker = self.versions.len() == 1 && self.versions[0].is_deleted();
        if only_marker {
            removed.extend(self.versions.drain(..));
        }
        removed
    }
}
