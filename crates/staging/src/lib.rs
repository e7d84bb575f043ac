//! chq - Staging
//!
//! Durable, per-destination append logs on local disk.
//!
//! # Layout
//!
//! ```text
//! <dir>/events.sql                 active staging file (appends go here)
//! <dir>/events.sql.3f0c...e1a2     rotated snapshot, owned by one load
//! ```
//!
//! Rows are acknowledged to the broker once they are in the active file.
//! Rotation renames the active file under the destination's critical
//! section, so an append lands either entirely before a rotation (in the
//! snapshot) or entirely after it (in a fresh active file).
//!
//! Snapshots are handed out as [`FlushSnapshot`] claims. A claimed snapshot
//! is invisible to orphan recovery until the claim is dropped.

mod area;
mod error;
mod metrics;
mod snapshot;

pub use area::{AppendReceipt, PendingFile, PendingKind, PendingSet, StagingArea};
pub use error::{Result, StagingError};
pub use metrics::{StagingMetrics, StagingMetricsSnapshot};
pub use snapshot::FlushSnapshot;

/// Extension of active staging files
pub const STAGING_EXTENSION: &str = "sql";
