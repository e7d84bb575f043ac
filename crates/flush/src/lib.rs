//! chq - Flush
//!
//! Moves staged rows into the store.
//!
//! # Architecture
//!
//! ```text
//!   append ──eligible?──► spawn_flush ─┐
//!   sweep timer (normal) ──────────────┼─► rotate ──► BulkLoader ──► Store
//!   sweep timer (forced) ──orphans─────┘                  │
//!                                             success: delete snapshot
//!                                             failure: keep for recovery
//! ```
//!
//! A destination becomes eligible when its oldest staged row reaches the
//! latency threshold or its staging file reaches the size threshold. Forced
//! sweeps ignore eligibility and also pick up snapshots left behind by
//! failed loads or crashed processes.

mod backoff;
mod error;
mod loader;
mod metrics;
mod scheduler;
mod timers;

pub use backoff::{Backoff, RetryPolicy};
pub use error::LoadError;
pub use loader::{BulkLoader, LoadOutcome, MAX_LOGGED_STATEMENT_CHARS};
pub use metrics::{FlushMetrics, FlushMetricsSnapshot};
pub use scheduler::{FlushScheduler, SweepKind, SweepReport};
pub use timers::Timers;
