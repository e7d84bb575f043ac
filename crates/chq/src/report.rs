//! Periodic metrics log line

use std::sync::Arc;

use chq_flush::FlushMetrics;
use chq_ingest::IngestMetrics;
use chq_staging::StagingArea;
use chq_store::SchemaCache;
use tracing::info;

use crate::engine::Engine;

/// Handles to every counter the daemon reports
#[derive(Clone)]
pub struct MetricsReport {
    cache: Arc<SchemaCache>,
    staging: Arc<StagingArea>,
    flush: Arc<FlushMetrics>,
    ingest: Arc<IngestMetrics>,
}

impl MetricsReport {
    pub fn new(engine: &Engine, ingest: Arc<IngestMetrics>) -> Self {
        Self {
            cache: Arc::clone(&engine.cache),
            staging: Arc::clone(&engine.staging),
            flush: Arc::clone(engine.scheduler.metrics()),
            ingest,
        }
    }

    /// Log one line with the current counter values
    pub fn log(&self) {
        let ingest = self.ingest.snapshot();
        let staging = self.staging.metrics().snapshot();
        let flush = self.flush.snapshot();
        let cache = self.cache.metrics().snapshot();

        info!(
            received = ingest.received,
            acked = ingest.acked,
            rejected = ingest.rejected,
            decode_errors = ingest.decode_errors,
            coercion_errors = ingest.coercion_errors,
            staging_errors = ingest.staging_errors,
            rows_staged = staging.rows_appended,
            bytes_staged = staging.bytes_appended,
            rotations = staging.rotations,
            snapshots_loaded = flush.snapshots_loaded,
            rows_loaded = flush.rows_loaded,
            statements = flush.statements,
            load_failures = flush.load_failures,
            retries = flush.retries,
            sweeps = flush.sweeps,
            schema_fetches = cache.fetches,
            schema_invalidations = cache.invalidations,
            "metrics"
        );
    }
}
