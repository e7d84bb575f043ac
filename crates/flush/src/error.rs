//! Load errors

use chq_staging::StagingError;
use chq_store::StoreError;

/// Errors from loading a snapshot
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Reading, rewriting or deleting the snapshot failed
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// The store refused or never answered; the snapshot is kept
    #[error("bulk insert into '{destination}' failed: {source}")]
    Store {
        destination: String,
        #[source]
        source: StoreError,
    },
}

impl LoadError {
    pub fn store(destination: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            destination: destination.into(),
            source,
        }
    }
}
