//! Store client abstraction
//!
//! The engine needs exactly two things from the store: column introspection
//! for a table and a multi-row insert. Everything else lives above this seam.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::StoreError;

/// One row of `DESCRIBE TABLE` output
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnDescription {
    /// Column name
    pub name: String,
    /// Declared store type, e.g. `Nullable(String)`
    #[serde(rename = "type")]
    pub column_type: String,
    /// Empty, `DEFAULT`, `MATERIALIZED` or `ALIAS`
    #[serde(default)]
    pub default_type: String,
    /// Default expression text, empty when absent
    #[serde(default)]
    pub default_expression: String,
}

impl ColumnDescription {
    /// Plain column with no default
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            default_type: String::new(),
            default_expression: String::new(),
        }
    }

    /// Attach a default of the given kind
    pub fn with_default(
        mut self,
        default_type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.default_type = default_type.into();
        self.default_expression = expression.into();
        self
    }
}

/// A multi-row insert into one table
///
/// Every row is a rendered tuple literal `(v1,v2,...)` whose positions
/// follow `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkInsert {
    /// Destination table
    pub table: String,
    /// Column names, in tuple order
    pub columns: Vec<String>,
    /// Rendered tuple literals
    pub rows: Vec<String>,
}

impl BulkInsert {
    /// Render the full `INSERT` statement
    pub fn statement(&self) -> String {
        let rows_len: usize = self.rows.iter().map(|r| r.len() + 1).sum();
        let mut sql = String::with_capacity(64 + rows_len);

        sql.push_str("INSERT INTO ");
        sql.push_str(&quote_identifier(&self.table));
        sql.push_str(" (");
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(&quote_identifier(column));
        }
        sql.push_str(") VALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                sql.push(',');
            }
            sql.push_str(row);
        }
        sql
    }
}

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// The store seam
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Column metadata for a table, in declaration order
    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, StoreError>;

    /// Execute a multi-row insert
    async fn bulk_insert(&self, insert: &BulkInsert) -> Result<(), StoreError>;
}
