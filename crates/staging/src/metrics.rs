//! Staging metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Staging area counters
#[derive(Debug, Default)]
pub struct StagingMetrics {
    /// Rows appended to active files
    pub rows_appended: AtomicU64,
    /// Bytes appended to active files
    pub bytes_appended: AtomicU64,
    /// Active files rotated into snapshots
    pub rotations: AtomicU64,
    /// Failed appends
    pub append_errors: AtomicU64,
}

impl StagingMetrics {
    pub const fn new() -> Self {
        Self {
            rows_appended: AtomicU64::new(0),
            bytes_appended: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            append_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_append(&self, bytes: u64) {
        self.rows_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_append_error(&self) {
        self.append_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StagingMetricsSnapshot {
        StagingMetricsSnapshot {
            rows_appended: self.rows_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            append_errors: self.append_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StagingMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingMetricsSnapshot {
    pub rows_appended: u64,
    pub bytes_appended: u64,
    pub rotations: u64,
    pub append_errors: u64,
}
