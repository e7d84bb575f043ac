//! Per-destination schema cache
//!
//! Schemas are fetched lazily and kept until something proves them stale.
//! Concurrent misses are serialized behind a single fetch lock and re-check
//! the cache once they hold it, so one miss issues one introspection query.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::client::Store;
use crate::error::StoreError;
use crate::schema::TableSchema;

/// Schema cache counters
#[derive(Debug, Default)]
pub struct SchemaCacheMetrics {
    /// Introspection queries issued
    pub fetches: AtomicU64,
    /// Entries dropped after a mismatch
    pub invalidations: AtomicU64,
    /// Lookups served from cache
    pub hits: AtomicU64,
}

impl SchemaCacheMetrics {
    pub fn snapshot(&self) -> SchemaCacheSnapshot {
        SchemaCacheSnapshot {
            fetches: self.fetches.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SchemaCacheMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaCacheSnapshot {
    pub fetches: u64,
    pub invalidations: u64,
    pub hits: u64,
}

/// Lazily populated destination → schema map
pub struct SchemaCache {
    store: Arc<dyn Store>,
    entries: DashMap<String, Arc<TableSchema>>,
    fetch_lock: Mutex<()>,
    metrics: SchemaCacheMetrics,
}

impl SchemaCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
            fetch_lock: Mutex::new(()),
            metrics: SchemaCacheMetrics::default(),
        }
    }

    /// Schema for a destination, fetching it on a miss
    pub async fn get(&self, destination: &str) -> Result<Arc<TableSchema>, StoreError> {
        if let Some(schema) = self.cached(destination) {
            return Ok(schema);
        }

        let _guard = self.fetch_lock.lock().await;
        if let Some(schema) = self.cached(destination) {
            return Ok(schema);
        }

        self.metrics.fetches.fetch_add(1, Ordering::Relaxed);
        let rows = self.store.describe(destination).await?;
        let schema = Arc::new(TableSchema::from_descriptions(rows));

        tracing::debug!(
            destination = %destination,
            columns = schema.len(),
            "schema fetched"
        );

        self.entries
            .insert(destination.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    fn cached(&self, destination: &str) -> Option<Arc<TableSchema>> {
        let schema = self.entries.get(destination).map(|e| Arc::clone(e.value()))?;
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(schema)
    }

    /// Drop a destination's entry; the next `get` refetches
    pub fn invalidate(&self, destination: &str) {
        if self.entries.remove(destination).is_some() {
            self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
            tracing::info!(destination = %destination, "schema invalidated");
        }
    }

    pub fn metrics(&self) -> &SchemaCacheMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.entries.len())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
