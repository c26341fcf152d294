//! Store and connection counters.
//!
//! All counters are atomic and can be read while operations are in progress.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one open store.
#[derive(Debug, Default)]
pub struct StoreStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    index_queries: AtomicU64,
    constraint_violations: AtomicU64,
    commits: AtomicU64,
    upgrades: AtomicU64,
    compactions: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_query(&self) {
        self.index_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_constraint_violation(&self) {
        self.constraint_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            index_queries: self.index_queries.load(Ordering::Relaxed),
            constraint_violations: self.constraint_violations.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            upgrades: self.upgrades.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatsSnapshot {
    /// Primary-key reads.
    pub reads: u64,
    /// Successful puts.
    pub writes: u64,
    /// Successful deletes.
    pub deletes: u64,
    /// Index and compound-index queries.
    pub index_queries: u64,
    /// Puts rejected by a unique index.
    pub constraint_violations: u64,
    /// Frames appended to the log.
    pub commits: u64,
    /// Upgrades committed.
    pub upgrades: u64,
    /// Log compactions.
    pub compactions: u64,
}

/// Lifecycle counters for a connection manager.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    opens: AtomicU64,
    reuses: AtomicU64,
    upgrades: AtomicU64,
    upgrade_failures: AtomicU64,
    closes: AtomicU64,
}

impl ConnectionStats {
    pub(crate) fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reuse(&self) {
        self.reuses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_upgrade_failure(&self) {
        self.upgrade_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            opens: self.opens.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            upgrades: self.upgrades.load(Ordering::Relaxed),
            upgrade_failures: self.upgrade_failures.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatsSnapshot {
    /// Stores opened from scratch.
    pub opens: u64,
    /// Calls answered with the cached handle.
    pub reuses: u64,
    /// Upgrades that ran at least one migration step.
    pub upgrades: u64,
    /// Upgrades that failed.
    pub upgrade_failures: u64,
    /// Handles released.
    pub closes: u64,
}
