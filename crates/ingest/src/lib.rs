//! chq - Ingest
//!
//! The broker-facing half of chq. Deliveries are decoded into records,
//! coerced against the destination schema, appended to the staging area and
//! only then acknowledged.
//!
//! ```text
//! Broker ─► decode ─► ValueCoercer ─► StagingArea ─► ack
//!                                          │
//!                                          └─► FlushScheduler (when eligible)
//! ```

mod consumer;
mod decode;
mod error;
mod metrics;

pub use consumer::IngestionLoop;
pub use decode::{DecodeError, decode};
pub use error::IngestError;
pub use metrics::{IngestMetrics, IngestMetricsSnapshot};
