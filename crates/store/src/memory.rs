//! In-process store
//!
//! Keeps table definitions and inserted tuples in memory and answers with the
//! same error shapes the ClickHouse HTTP interface produces. Used to embed the
//! engine without a server and as the test double for everything above the
//! [`Store`] seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{BulkInsert, ColumnDescription, Store};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnDescription>,
    rows: Vec<String>,
}

/// Store backed by in-memory tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
    inserts: Mutex<Vec<BulkInsert>>,
    describe_calls: AtomicU64,
    failing_inserts: AtomicU32,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table
    pub fn create_table(&self, table: &str, columns: Vec<ColumnDescription>) {
        self.tables.lock().insert(
            table.to_string(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Append a column to an existing table
    pub fn add_column(&self, table: &str, column: ColumnDescription) {
        if let Some(t) = self.tables.lock().get_mut(table) {
            t.columns.push(column);
        }
    }

    /// Rows inserted into a table so far
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, |t| t.rows.len())
    }

    /// Tuples inserted into a table, in insert order
    pub fn rows(&self, table: &str) -> Vec<String> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every successful insert, in order
    pub fn inserts(&self) -> Vec<BulkInsert> {
        self.inserts.lock().clone()
    }

    /// Number of `describe` calls received
    pub fn describe_calls(&self) -> u64 {
        self.describe_calls.load(Ordering::Relaxed)
    }

    /// Fail the next `n` inserts with a server error
    pub fn fail_next_inserts(&self, n: u32) {
        self.failing_inserts.store(n, Ordering::Relaxed);
    }

    /// Simulate the store going away (or coming back)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

fn unknown_table(table: &str) -> StoreError {
    StoreError::Rejected {
        status: 404,
        body: format!("Code: 60. DB::Exception: Table default.{table} does not exist. (UNKNOWN_TABLE)"),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        self.describe_calls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        self.tables
            .lock()
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| unknown_table(table))
    }

    async fn bulk_insert(&self, insert: &BulkInsert) -> Result<(), StoreError> {
        self.check_available()?;

        let pending_failures = self.failing_inserts.load(Ordering::Relaxed);
        if pending_failures > 0 {
            self.failing_inserts
                .store(pending_failures - 1, Ordering::Relaxed);
            return Err(StoreError::Rejected {
                status: 503,
                body: "Code: 202. DB::Exception: Too many simultaneous queries. (TOO_MANY_SIMULTANEOUS_QUERIES)".into(),
            });
        }

        let mut tables = self.tables.lock();
        let target = tables
            .get_mut(&insert.table)
            .ok_or_else(|| unknown_table(&insert.table))?;

        if let Some(missing) = insert
            .columns
            .iter()
            .find(|c| !target.columns.iter().any(|d| &d.name == *c))
        {
            return Err(StoreError::Rejected {
                status: 500,
                body: format!(
                    "Code: 16. DB::Exception: No such column {missing} in table default.{}. (NO_SUCH_COLUMN_IN_TABLE)",
                    insert.table
                ),
            });
        }

        target.rows.extend(insert.rows.iter().cloned());
        drop(tables);

        self.inserts.lock().push(insert.clone());
        Ok(())
    }
}
