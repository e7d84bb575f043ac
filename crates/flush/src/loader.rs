//! Bulk loader
//!
//! Turns one claimed snapshot into as few `INSERT` statements as its rows
//! allow. Rows are grouped into runs of consecutive lines with the same
//! column list; a snapshot written under a single schema version is one
//! statement. After each committed run the snapshot is rewritten with only
//! the rows still to go, so a retry never inserts a run twice.

use std::sync::Arc;

use chq_staging::FlushSnapshot;
use chq_store::{BulkInsert, SchemaCache, StagedRow, Store, StoreError};

use crate::backoff::RetryPolicy;
use crate::error::LoadError;
use crate::metrics::FlushMetrics;

/// Statements are cut to this many characters in error logs
pub const MAX_LOGGED_STATEMENT_CHARS: usize = 255;

/// Result of a completed load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Rows inserted
    pub rows: usize,
    /// Statements issued
    pub statements: usize,
    /// Lines skipped as unparseable
    pub skipped: usize,
}

/// One run of consecutive rows sharing a column list
#[derive(Debug)]
struct Run<'a> {
    columns: Vec<String>,
    tuples: Vec<String>,
    /// Raw lines, kept for rewriting the snapshot
    lines: Vec<&'a str>,
}

/// Loads snapshots into the store
pub struct BulkLoader {
    store: Arc<dyn Store>,
    cache: Arc<SchemaCache>,
    retry: RetryPolicy,
    metrics: Arc<FlushMetrics>,
}

impl BulkLoader {
    pub fn new(store: Arc<dyn Store>, cache: Arc<SchemaCache>, retry: RetryPolicy) -> Self {
        Self {
            store,
            cache,
            retry,
            metrics: Arc::new(FlushMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<FlushMetrics> {
        &self.metrics
    }

    /// Load a snapshot, deleting it once every row is in the store
    ///
    /// On failure the snapshot stays on disk and the claim is released when
    /// `snapshot` is dropped, so a later forced sweep picks it up again.
    pub async fn load(&self, snapshot: FlushSnapshot) -> Result<LoadOutcome, LoadError> {
        let destination = snapshot.destination().to_string();

        let Some(contents) = snapshot.read().await? else {
            tracing::debug!(
                destination = %destination,
                snapshot = %snapshot.path().display(),
                "snapshot already gone"
            );
            return Ok(LoadOutcome::default());
        };

        let (runs, skipped) = parse_runs(&contents);
        if skipped > 0 {
            self.metrics.record_skipped_lines(skipped as u64);
            tracing::warn!(
                destination = %destination,
                snapshot = %snapshot.path().display(),
                skipped,
                "skipped unparseable staged lines"
            );
        }

        let mut outcome = LoadOutcome {
            skipped,
            ..LoadOutcome::default()
        };

        for (i, run) in runs.iter().enumerate() {
            let insert = BulkInsert {
                table: destination.clone(),
                columns: run.columns.clone(),
                rows: run.tuples.clone(),
            };

            if let Err(e) = self.insert_with_retry(&insert).await {
                self.metrics.record_load_failure();
                if e.is_unknown_column() {
                    self.cache.invalidate(&destination);
                }
                tracing::error!(
                    destination = %destination,
                    snapshot = %snapshot.path().display(),
                    rows = insert.rows.len(),
                    error = %e,
                    statement = %truncate(&insert.statement(), MAX_LOGGED_STATEMENT_CHARS),
                    "bulk insert failed, keeping snapshot"
                );
                return Err(LoadError::store(destination, e));
            }

            self.metrics.record_statement(insert.rows.len() as u64);
            outcome.rows += insert.rows.len();
            outcome.statements += 1;

            let rest = &runs[i + 1..];
            if !rest.is_empty() {
                snapshot.replace(&remaining_contents(rest)).await?;
            }
        }

        let path = snapshot.path().display().to_string();
        let orphan = snapshot.is_orphan();
        snapshot.remove().await?;
        self.metrics.record_snapshot_loaded();

        tracing::info!(
            destination = %destination,
            snapshot = %path,
            rows = outcome.rows,
            statements = outcome.statements,
            orphan,
            "snapshot loaded"
        );

        Ok(outcome)
    }

    async fn insert_with_retry(&self, insert: &BulkInsert) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match self.store.bulk_insert(insert).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.retry.retries => {
                    let delay = self.retry.backoff.delay(attempt);
                    attempt += 1;
                    self.metrics.record_retry();
                    tracing::warn!(
                        destination = %insert.table,
                        attempt,
                        max_attempts = self.retry.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "insert failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for BulkLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkLoader")
            .field("retry", &self.retry)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

/// Split snapshot contents into runs, counting unparseable lines
///
/// A final segment without a trailing newline is a torn write and is
/// skipped along with anything else that doesn't parse.
fn parse_runs(contents: &str) -> (Vec<Run<'_>>, usize) {
    let mut runs: Vec<Run<'_>> = Vec::new();
    let mut skipped = 0;

    let complete = match contents.rfind('\n') {
        Some(end) => {
            if end + 1 < contents.len() {
                skipped += 1;
            }
            &contents[..end]
        }
        None => {
            if !contents.is_empty() {
                skipped += 1;
            }
            ""
        }
    };

    for line in complete.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        let Some(row) = StagedRow::parse(line) else {
            skipped += 1;
            continue;
        };

        match runs.last_mut() {
            Some(run) if run.columns == row.columns => {
                run.tuples.push(row.tuple);
                run.lines.push(line);
            }
            _ => runs.push(Run {
                columns: row.columns,
                tuples: vec![row.tuple],
                lines: vec![line],
            }),
        }
    }

    (runs, skipped)
}

fn remaining_contents(runs: &[Run<'_>]) -> String {
    let mut out = String::new();
    for line in runs.iter().flat_map(|r| r.lines.iter()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod loader_test;
