//! Coalescer counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, updated by enqueue callers and workers.
#[derive(Debug, Default)]
pub struct CoalescerMetrics {
    enqueued: AtomicU64,
    merged: AtomicU64,
    priority_raised: AtomicU64,
    indexed: AtomicU64,
    removed: AtomicU64,
    failed: AtomicU64,
    skipped_claims: AtomicU64,
    forced_commits: AtomicU64,
    forced_commit_failures: AtomicU64,
}

impl CoalescerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_created(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_merged(&self, raised: bool) {
        self.merged.fetch_add(1, Ordering::Relaxed);
        if raised {
            self.priority_raised.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_indexed(&self) {
        self.indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped_claim(&self) {
        self.skipped_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forced_commit(&self, ok: bool) {
        if ok {
            self.forced_commits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.forced_commit_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CoalescerStats {
        CoalescerStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            priority_raised: self.priority_raised.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_claims: self.skipped_claims.load(Ordering::Relaxed),
            forced_commits: self.forced_commits.load(Ordering::Relaxed),
            forced_commit_failures: self.forced_commit_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the coalescer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerStats {
    /// New pending requests created
    pub enqueued: u64,
    /// Enqueues folded into an existing pending request
    pub merged: u64,
    /// Merges that made the pending request more urgent
    pub priority_raised: u64,
    pub indexed: u64,
    /// Executions whose record no longer existed
    pub removed: u64,
    pub failed: u64,
    /// Claims lost to another worker
    pub skipped_claims: u64,
    pub forced_commits: u64,
    pub forced_commit_failures: u64,
}

impl CoalescerStats {
    /// Executions that reached `Done`.
    pub fn completed(&self) -> u64 {
        self.indexed + self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = CoalescerMetrics::new();
        metrics.record_created();
        metrics.record_merged(true);
        metrics.record_merged(false);
        metrics.record_indexed();
        metrics.record_removed();
        metrics.record_forced_commit(false);

        let stats = metrics.snapshot();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.merged, 2);
        assert_eq!(stats.priority_raised, 1);
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.forced_commits, 0);
        assert_eq!(stats.forced_commit_failures, 1);
    }
}
