//! chq - Store
//!
//! Everything that talks to, or reasons about, the columnar store.
//!
//! # Architecture
//!
//! ```text
//! [RawRecord] --> [ValueCoercer] --> [CoercedRow] --> staging
//!                      |
//!                 [SchemaCache] --describe--> [Store]
//!                                               ^
//!                       [BulkInsert] --insert---+
//! ```
//!
//! # Stores
//!
//! | Store | Purpose |
//! |-------|---------|
//! | `ClickHouseStore` | ClickHouse HTTP interface |
//! | `MemoryStore` | In-process tables for embedding and tests |

mod cache;
mod clickhouse;
mod client;
mod coerce;
mod error;
mod literal;
pub mod memory;
mod record;
mod schema;

pub use cache::{SchemaCache, SchemaCacheMetrics, SchemaCacheSnapshot};
pub use clickhouse::ClickHouseStore;
pub use client::{BulkInsert, ColumnDescription, Store, quote_identifier};
pub use coerce::ValueCoercer;
pub use error::{CoercionError, StoreError};
pub use literal::{MAX_STRING_CHARS, NULL_LITERAL};
pub use memory::MemoryStore;
pub use record::{CoercedRow, RawRecord, StagedRow, is_valid_destination};
pub use schema::{ColumnSchema, LogicalType, TableSchema};
