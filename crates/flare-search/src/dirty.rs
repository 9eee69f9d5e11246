//! Dirty tracker.
//!
//! Counts documents added and removed since the last successful commit. The
//! counters only move back towards zero when a commit succeeds; a failed
//! commit leaves them untouched so the next commit attempt still sees the
//! index as dirty.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the tracker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirtyCounts {
    pub adds: u64,
    pub deletes: u64,
}

impl DirtyCounts {
    pub fn is_dirty(&self) -> bool {
        self.adds > 0 || self.deletes > 0
    }
}

/// Uncommitted change counters, shared by every writer of a session.
#[derive(Debug, Default)]
pub struct DirtyTracker {
    adds: AtomicU64,
    deletes: AtomicU64,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` documents sent to the backend.
    pub fn record_add(&self, count: u64) {
        self.adds.fetch_add(count, Ordering::AcqRel);
    }

    /// Record `count` delete operations sent to the backend.
    pub fn record_delete(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::AcqRel);
    }

    /// True when anything was added or deleted since the last commit.
    pub fn dirty(&self) -> bool {
        self.counts().is_dirty()
    }

    /// True when a delete is awaiting commit.
    pub fn delete_dirty(&self) -> bool {
        self.deletes.load(Ordering::Acquire) > 0
    }

    pub fn counts(&self) -> DirtyCounts {
        DirtyCounts {
            adds: self.adds.load(Ordering::Acquire),
            deletes: self.deletes.load(Ordering::Acquire),
        }
    }

    /// Capture the counters just before a commit is issued.
    pub fn snapshot(&self) -> DirtyCounts {
        self.counts()
    }

    /// Clear the changes covered by a successful commit.
    ///
    /// Only the snapshot is subtracted, so writes that raced with the commit
    /// keep the tracker dirty.
    pub fn settle(&self, covered: DirtyCounts) {
        saturating_sub(&self.adds, covered.adds);
        saturating_sub(&self.deletes, covered.deletes);
    }

    /// Zero both counters.
    pub fn reset(&self) {
        self.adds.store(0, Ordering::Release);
        self.deletes.store(0, Ordering::Release);
    }
}

fn saturating_sub(counter: &AtomicU64, amount: u64) {
    if amount == 0 {
        return;
    }
    // Err only when the closure returns None, which it never does.
    let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        Some(current.saturating_sub(amount))
    });
}
