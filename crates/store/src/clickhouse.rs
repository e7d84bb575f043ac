//! ClickHouse HTTP store
//!
//! Statements are POSTed as plain text to the HTTP interface. Introspection
//! uses `DESCRIBE TABLE ... FORMAT JSON`; inserts are one multi-row
//! `INSERT ... VALUES` statement per call.

use std::time::Duration;

use async_trait::async_trait;
use chq_config::StoreConfig;
use serde::Deserialize;

use crate::client::{BulkInsert, ColumnDescription, Store, quote_identifier};
use crate::error::StoreError;

/// Store speaking the ClickHouse HTTP protocol
#[derive(Debug, Clone)]
pub struct ClickHouseStore {
    client: reqwest::Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl ClickHouseStore {
    /// Build a client from configuration
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint(&config.url, &config.database),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Endpoint statements are posted to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute(&self, statement: String) -> Result<String, StoreError> {
        let mut request = self.client.post(&self.endpoint).body(statement);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}

fn endpoint(url: &str, database: &str) -> String {
    let encoded: String = database
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.') {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect();
    format!("{}/?database={}", url.trim_end_matches('/'), encoded)
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    data: Vec<ColumnDescription>,
}

/// Parse a `DESCRIBE TABLE ... FORMAT JSON` response body
pub(crate) fn parse_describe(table: &str, body: &str) -> Result<Vec<ColumnDescription>, StoreError> {
    let response: DescribeResponse =
        serde_json::from_str(body).map_err(|e| StoreError::InvalidSchema {
            table: table.to_string(),
            message: e.to_string(),
        })?;
    Ok(response.data)
}

#[async_trait]
impl Store for ClickHouseStore {
    async fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, StoreError> {
        let statement = format!("DESCRIBE TABLE {} FORMAT JSON", quote_identifier(table));
        let body = self.execute(statement).await?;
        parse_describe(table, &body)
    }

    async fn bulk_insert(&self, insert: &BulkInsert) -> Result<(), StoreError> {
        self.execute(insert.statement()).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "clickhouse_test.rs"]
mod clickhouse_test;
