//! Component wiring shared by every command

use std::sync::Arc;

use anyhow::{Context, Result};
use chq_config::Config;
use chq_flush::{BulkLoader, FlushScheduler, RetryPolicy};
use chq_staging::StagingArea;
use chq_store::{ClickHouseStore, SchemaCache, Store, ValueCoercer};

/// Store, schema cache, staging area and flush scheduler for one config
pub struct Engine {
    pub cache: Arc<SchemaCache>,
    pub coercer: Arc<ValueCoercer>,
    pub staging: Arc<StagingArea>,
    pub scheduler: Arc<FlushScheduler>,
}

impl Engine {
    /// Build against the configured ClickHouse server
    pub async fn build(config: &Config) -> Result<Self> {
        Self::with_staging(config, open_staging(config).await?)
    }

    /// Build against the configured ClickHouse server over an open staging area
    pub fn with_staging(config: &Config, staging: Arc<StagingArea>) -> Result<Self> {
        let store = ClickHouseStore::new(&config.store).context("failed to create store client")?;
        Ok(Self::assemble(config, Arc::new(store), staging))
    }

    /// Build against any store
    pub async fn with_store(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self::assemble(config, store, open_staging(config).await?))
    }

    pub fn assemble(config: &Config, store: Arc<dyn Store>, staging: Arc<StagingArea>) -> Self {
        let cache = Arc::new(SchemaCache::new(Arc::clone(&store)));
        let loader = BulkLoader::new(
            store,
            Arc::clone(&cache),
            RetryPolicy::from(&config.store),
        );
        let scheduler = FlushScheduler::new(Arc::clone(&staging), Arc::new(loader), &config.flush);

        Self {
            coercer: Arc::new(ValueCoercer::new(Arc::clone(&cache))),
            cache,
            staging,
            scheduler: Arc::new(scheduler),
        }
    }
}

/// Open the configured staging directory
pub async fn open_staging(config: &Config) -> Result<Arc<StagingArea>> {
    let staging = StagingArea::open(&config.staging)
        .await
        .with_context(|| {
            format!(
                "failed to open staging directory {}",
                config.staging.path.display()
            )
        })?;
    Ok(Arc::new(staging))
}
