//! Flush metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Flush and load counters
#[derive(Debug, Default)]
pub struct FlushMetrics {
    /// Snapshots fully loaded and deleted
    pub snapshots_loaded: AtomicU64,
    /// Rows inserted into the store
    pub rows_loaded: AtomicU64,
    /// INSERT statements that succeeded
    pub statements: AtomicU64,
    /// Loads that left their snapshot on disk
    pub load_failures: AtomicU64,
    /// In-place insert retries
    pub retries: AtomicU64,
    /// Staged lines dropped as unparseable
    pub skipped_lines: AtomicU64,
    /// Sweeps run to completion
    pub sweeps: AtomicU64,
    /// Sweeps skipped because one of the same kind was running
    pub sweeps_skipped: AtomicU64,
}

impl FlushMetrics {
    pub const fn new() -> Self {
        Self {
            snapshots_loaded: AtomicU64::new(0),
            rows_loaded: AtomicU64::new(0),
            statements: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            skipped_lines: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            sweeps_skipped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_statement(&self, rows: u64) {
        self.statements.fetch_add(1, Ordering::Relaxed);
        self.rows_loaded.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_snapshot_loaded(&self) {
        self.snapshots_loaded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped_lines(&self, n: u64) {
        self.skipped_lines.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sweep_skipped(&self) {
        self.sweeps_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlushMetricsSnapshot {
        FlushMetricsSnapshot {
            snapshots_loaded: self.snapshots_loaded.load(Ordering::Relaxed),
            rows_loaded: self.rows_loaded.load(Ordering::Relaxed),
            statements: self.statements.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            skipped_lines: self.skipped_lines.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweeps_skipped: self.sweeps_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FlushMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushMetricsSnapshot {
    pub snapshots_loaded: u64,
    pub rows_loaded: u64,
    pub statements: u64,
    pub load_failures: u64,
    pub retries: u64,
    pub skipped_lines: u64,
    pub sweeps: u64,
    pub sweeps_skipped: u64,
}
