//! Fatal ingestion errors
//!
//! Per-message failures are resolved by rejecting the delivery. Anything
//! that reaches this type ends the loop and the process.

use chq_broker::BrokerError;
use chq_store::CoercionError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Broker connection or acknowledgement failure
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The store could not be reached while fetching a schema
    #[error("schema introspection for '{destination}' failed: {source}")]
    StoreUnavailable {
        destination: String,
        #[source]
        source: CoercionError,
    },

    /// The subscription ended without being cancelled
    #[error("broker subscription ended unexpectedly")]
    SubscriptionEnded,

    /// A message task panicked or was aborted
    #[error("message task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    /// The broker session is gone; back off before exiting
    pub fn is_broker_connection(&self) -> bool {
        match self {
            Self::Broker(e) => e.is_connection(),
            Self::SubscriptionEnded => true,
            _ => false,
        }
    }
}
