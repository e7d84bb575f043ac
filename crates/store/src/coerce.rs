//! Schema-aware value coercion
//!
//! Turns the weakly typed fields of a [`RawRecord`] into a [`CoercedRow`] of
//! store literals. Unknown columns get one chance at self-healing: the cached
//! schema is dropped, refetched, and the whole record is coerced again.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::SchemaCache;
use crate::error::CoercionError;
use crate::literal::{
    NULL_LITERAL, float_literal, int_literal, is_falsy, is_non_scalar, passthrough_literal,
    string_literal,
};
use crate::record::{CoercedRow, RawRecord};
use crate::schema::{ColumnSchema, LogicalType, TableSchema};

/// Converts raw field values into store literals
#[derive(Debug, Clone)]
pub struct ValueCoercer {
    cache: Arc<SchemaCache>,
}

impl ValueCoercer {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    /// The schema cache backing this coercer
    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Coerce a single field of a destination
    pub async fn coerce(
        &self,
        destination: &str,
        column: &str,
        raw: &Value,
    ) -> Result<String, CoercionError> {
        let schema = self.cache.get(destination).await?;
        let column = lookup(&schema, destination, column)?;
        coerce_value(column, raw)
    }

    /// Coerce and default every field of a record
    ///
    /// An unknown column invalidates the destination's schema and the record
    /// is retried once against the refetched schema.
    pub async fn coerce_record(&self, record: &RawRecord) -> Result<CoercedRow, CoercionError> {
        let schema = self.cache.get(&record.destination).await?;
        match coerce_with_schema(&schema, record) {
            Err(CoercionError::UnknownColumn { column, .. }) => {
                tracing::info!(
                    destination = %record.destination,
                    column = %column,
                    "unknown column, refreshing schema"
                );
                self.cache.invalidate(&record.destination);
                let schema = self.cache.get(&record.destination).await?;
                coerce_with_schema(&schema, record)
            }
            result => result,
        }
    }

    /// Fill every absent insertable column of a row
    ///
    /// Absent columns take their default expression, else `NULL` when
    /// nullable, else the empty string.
    pub fn set_defaults(schema: &TableSchema, values: BTreeMap<String, String>) -> CoercedRow {
        fill_defaults(schema, values)
    }
}

fn lookup<'a>(
    schema: &'a TableSchema,
    destination: &str,
    column: &str,
) -> Result<&'a ColumnSchema, CoercionError> {
    let found = schema
        .column(column)
        .ok_or_else(|| CoercionError::UnknownColumn {
            destination: destination.to_string(),
            column: column.to_string(),
        })?;
    if !found.insertable {
        return Err(CoercionError::NotInsertable {
            destination: destination.to_string(),
            column: column.to_string(),
        });
    }
    Ok(found)
}

/// Coerce one value against its column
pub(crate) fn coerce_value(column: &ColumnSchema, raw: &Value) -> Result<String, CoercionError> {
    let falsy = is_falsy(raw);

    if is_non_scalar(raw) {
        if !falsy {
            return Err(CoercionError::NonScalar {
                column: column.name.clone(),
            });
        }
        return Ok(NULL_LITERAL.to_string());
    }

    let empty_string = matches!(raw, Value::String(s) if s.is_empty());
    if column.nullable && falsy && !empty_string {
        return Ok(NULL_LITERAL.to_string());
    }

    Ok(match column.logical_type {
        LogicalType::Int => int_literal(raw),
        LogicalType::Float => float_literal(raw),
        LogicalType::String => string_literal(raw),
        LogicalType::Passthrough => passthrough_literal(raw),
    })
}

fn coerce_with_schema(schema: &TableSchema, record: &RawRecord) -> Result<CoercedRow, CoercionError> {
    let mut values = BTreeMap::new();
    for (name, raw) in &record.fields {
        let column = lookup(schema, &record.destination, name)?;
        values.insert(name.clone(), coerce_value(column, raw)?);
    }
    Ok(fill_defaults(schema, values))
}

fn fill_defaults(schema: &TableSchema, mut values: BTreeMap<String, String>) -> CoercedRow {
    for column in schema.columns() {
        if !column.insertable || values.contains_key(&column.name) {
            continue;
        }
        let literal = match (&column.default_expression, column.nullable) {
            (Some(expr), _) => single_line(expr),
            (None, true) => NULL_LITERAL.to_string(),
            (None, false) => "''".to_string(),
        };
        values.insert(column.name.clone(), literal);
    }
    CoercedRow::new(values)
}

fn single_line(expr: &str) -> String {
    expr.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
#[path = "coerce_test.rs"]
mod coerce_test;
