//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-message counters of the ingestion loop
#[derive(Debug, Default)]
pub struct IngestMetrics {
    /// Deliveries received from the broker
    pub received: AtomicU64,
    /// Deliveries acknowledged after a durable append
    pub acked: AtomicU64,
    /// Deliveries rejected
    pub rejected: AtomicU64,
    /// Messages that could not be decoded
    pub decode_errors: AtomicU64,
    /// Records that failed coercion
    pub coercion_errors: AtomicU64,
    /// Appends that failed on local I/O
    pub staging_errors: AtomicU64,
    /// Flushes started because a destination became eligible
    pub flushes_triggered: AtomicU64,
}

impl IngestMetrics {
    pub const fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            acked: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            coercion_errors: AtomicU64::new(0),
            staging_errors: AtomicU64::new(0),
            flushes_triggered: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_coercion_error(&self) {
        self.coercion_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_staging_error(&self) {
        self.staging_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush_triggered(&self) {
        self.flushes_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            coercion_errors: self.coercion_errors.load(Ordering::Relaxed),
            staging_errors: self.staging_errors.load(Ordering::Relaxed),
            flushes_triggered: self.flushes_triggered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
    pub received: u64,
    pub acked: u64,
    pub rejected: u64,
    pub decode_errors: u64,
    pub coercion_errors: u64,
    pub staging_errors: u64,
    pub flushes_triggered: u64,
}
