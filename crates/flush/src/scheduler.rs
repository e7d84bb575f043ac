//! Flush scheduler
//!
//! Owns the flush policy and the two sweep classes. Normal sweeps flush
//! eligible destinations; forced sweeps flush everything and recover
//! orphaned snapshots. Each class has its own guard, so a long recovery never
//! blocks the regular cadence and two sweeps of one class never overlap.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chq_config::FlushConfig;
use chq_staging::StagingArea;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::error::LoadError;
use crate::loader::{BulkLoader, LoadOutcome};
use crate::metrics::FlushMetrics;
use crate::timers::Timers;

/// Sweep class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    /// Flush destinations whose data is eligible
    Normal,
    /// Flush every destination and recover orphaned snapshots
    Forced,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Forced => "forced",
        }
    }
}

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Destinations rotated and loaded
    pub flushed: usize,
    /// Orphaned snapshots loaded
    pub recovered: usize,
    /// Loads that failed (data kept)
    pub failed: usize,
    /// Rows inserted
    pub rows: usize,
}

/// Decides when to flush and runs flushes
pub struct FlushScheduler {
    staging: Arc<StagingArea>,
    loader: Arc<BulkLoader>,
    latency_threshold: Duration,
    size_threshold: u64,
    started: AtomicBool,
    normal_guard: Semaphore,
    forced_guard: Semaphore,
    in_flight: Mutex<HashSet<String>>,
    tracker: TaskTracker,
}

impl FlushScheduler {
    pub fn new(staging: Arc<StagingArea>, loader: Arc<BulkLoader>, config: &FlushConfig) -> Self {
        Self {
            staging,
            loader,
            latency_threshold: config.latency_threshold,
            size_threshold: config.size_threshold,
            started: AtomicBool::new(false),
            normal_guard: Semaphore::new(1),
            forced_guard: Semaphore::new(1),
            in_flight: Mutex::new(HashSet::new()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn staging(&self) -> &Arc<StagingArea> {
        &self.staging
    }

    pub fn metrics(&self) -> &Arc<FlushMetrics> {
        self.loader.metrics()
    }

    /// Startup catch-up has finished
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Policy
    // =========================================================================

    /// Whether a destination's staged data should be flushed now
    pub fn eligible(&self, destination: &str) -> bool {
        if !self.is_started() {
            return true;
        }
        let Some(first_pending) = self.staging.first_pending(destination) else {
            return false;
        };
        if first_pending.elapsed() >= self.latency_threshold {
            return true;
        }
        self.staging.pending_bytes(destination) >= self.size_threshold
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    /// Rotate a destination and load the snapshot
    ///
    /// `Ok(None)` when there was nothing staged.
    pub async fn flush(&self, destination: &str) -> Result<Option<LoadOutcome>, LoadError> {
        let Some(snapshot) = self.staging.rotate(destination).await? else {
            return Ok(None);
        };
        self.loader.load(snapshot).await.map(Some)
    }

    /// Flush a destination in a tracked background task
    ///
    /// Does nothing if a spawned flush for the destination is still running.
    pub fn spawn_flush(self: &Arc<Self>, destination: &str) {
        if !self.in_flight.lock().insert(destination.to_string()) {
            return;
        }

        let scheduler = Arc::clone(self);
        let destination = destination.to_string();
        self.tracker.spawn(async move {
            if let Err(e) = scheduler.flush(&destination).await {
                tracing::warn!(destination = %destination, error = %e, "flush failed");
            }
            scheduler.in_flight.lock().remove(&destination);
        });
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Run one sweep; `None` if a sweep of the same kind is already running
    pub async fn sweep(&self, kind: SweepKind) -> Option<SweepReport> {
        let guard = match kind {
            SweepKind::Normal => &self.normal_guard,
            SweepKind::Forced => &self.forced_guard,
        };
        let Ok(_permit) = guard.try_acquire() else {
            self.metrics().record_sweep_skipped();
            tracing::debug!(kind = kind.as_str(), "sweep already running, skipping");
            return None;
        };

        let include_orphans = kind == SweepKind::Forced;
        let pending = match self.staging.list_pending(include_orphans).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(
                    kind = kind.as_str(),
                    error = %e,
                    "listing staging directory failed"
                );
                return Some(SweepReport::default());
            }
        };

        let mut report = SweepReport::default();

        for destination in &pending.destinations {
            if kind == SweepKind::Normal && !self.eligible(destination) {
                continue;
            }
            match self.flush(destination).await {
                Ok(Some(outcome)) => {
                    report.flushed += 1;
                    report.rows += outcome.rows;
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(destination = %destination, error = %e, "sweep flush failed");
                }
            }
        }

        for orphan in pending.orphans {
            let destination = orphan.destination().to_string();
            match self.loader.load(orphan).await {
                Ok(outcome) => {
                    report.recovered += 1;
                    report.rows += outcome.rows;
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(destination = %destination, error = %e, "orphan recovery failed");
                }
            }
        }

        self.metrics().record_sweep();
        if report != SweepReport::default() {
            tracing::info!(
                kind = kind.as_str(),
                flushed = report.flushed,
                recovered = report.recovered,
                failed = report.failed,
                rows = report.rows,
                "sweep finished"
            );
        }

        Some(report)
    }

    /// Catch up on leftovers, then switch to threshold-based flushing
    pub async fn startup(&self) -> SweepReport {
        let mut total = SweepReport::default();
        for kind in [SweepKind::Normal, SweepKind::Forced] {
            if let Some(report) = self.sweep(kind).await {
                total.flushed += report.flushed;
                total.recovered += report.recovered;
                total.failed += report.failed;
                total.rows += report.rows;
            }
        }
        self.started.store(true, Ordering::SeqCst);

        tracing::info!(
            flushed = total.flushed,
            recovered = total.recovered,
            failed = total.failed,
            rows = total.rows,
            "startup catch-up complete"
        );
        total
    }

    /// Install the periodic normal and forced sweeps
    pub fn schedule(
        self: &Arc<Self>,
        timers: &Timers,
        sweep_interval: Duration,
        recovery_interval: Duration,
    ) {
        let scheduler = Arc::clone(self);
        timers.repeat(sweep_interval, move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.sweep(SweepKind::Normal).await;
            }
        });

        let scheduler = Arc::clone(self);
        timers.repeat(recovery_interval, move || {
            let scheduler = Arc::clone(&scheduler);
            async move {
                scheduler.sweep(SweepKind::Forced).await;
            }
        });
    }

    /// Wait for spawned flushes, at most `grace`
    ///
    /// Returns false if flushes were still running when the grace expired.
    /// Their snapshots stay on disk for the next process to recover.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if !drained {
            tracing::warn!(
                in_flight = self.tracker.len(),
                grace_ms = grace.as_millis() as u64,
                "flushes still running after grace period"
            );
        }
        drained
    }
}

impl std::fmt::Debug for FlushScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushScheduler")
            .field("latency_threshold", &self.latency_threshold)
            .field("size_threshold", &self.size_threshold)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;
