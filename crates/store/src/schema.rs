//! Table schema model
//!
//! Store types are collapsed into the three coercion classes the ingestion
//! path cares about, plus a passthrough class for everything else.

use std::collections::HashMap;

use crate::client::ColumnDescription;

/// Coercion class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    /// Integer and boolean types
    Int,
    /// Floating point and decimal types
    Float,
    /// Strings, dates, UUIDs, enums, IP addresses
    String,
    /// Anything else; values are rendered as-is
    Passthrough,
}

impl LogicalType {
    /// Classify a store type name after unwrapping its modifiers
    pub fn from_store_type(base: &str) -> Self {
        let head = base.split('(').next().unwrap_or(base).trim();
        match head {
            "Int8" | "Int16" | "Int32" | "Int64" | "Int128" | "Int256" | "UInt8" | "UInt16"
            | "UInt32" | "UInt64" | "UInt128" | "UInt256" | "Bool" | "Boolean" => Self::Int,
            "Float32" | "Float64" | "Decimal" | "Decimal32" | "Decimal64" | "Decimal128"
            | "Decimal256" => Self::Float,
            "String" | "FixedString" | "Date" | "Date32" | "DateTime" | "DateTime64" | "UUID"
            | "Enum8" | "Enum16" | "Enum" | "IPv4" | "IPv6" => Self::String,
            _ => Self::Passthrough,
        }
    }
}

/// Strip `Nullable(...)` and `LowCardinality(...)` wrappers
///
/// Returns the inner type and whether any layer was `Nullable`.
pub(crate) fn unwrap_modifiers(store_type: &str) -> (&str, bool) {
    let mut current = store_type.trim();
    let mut nullable = false;
    loop {
        if let Some(inner) = strip_wrapper(current, "Nullable") {
            nullable = true;
            current = inner;
        } else if let Some(inner) = strip_wrapper(current, "LowCardinality") {
            current = inner;
        } else {
            return (current, nullable);
        }
    }
}

fn strip_wrapper<'a>(ty: &'a str, wrapper: &str) -> Option<&'a str> {
    ty.strip_prefix(wrapper)?
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

/// One column of a destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
    pub nullable: bool,
    /// Expression used when the field is absent (`DEFAULT` columns only)
    pub default_expression: Option<String>,
    /// Declared type as reported by the store
    pub store_type: String,
    /// False for `MATERIALIZED` and `ALIAS` columns
    pub insertable: bool,
}

impl From<ColumnDescription> for ColumnSchema {
    fn from(desc: ColumnDescription) -> Self {
        let (base, nullable) = unwrap_modifiers(&desc.column_type);
        let logical_type = LogicalType::from_store_type(base);
        let computed = matches!(desc.default_type.as_str(), "MATERIALIZED" | "ALIAS");
        let default_expression = (!computed && !desc.default_expression.is_empty())
            .then(|| desc.default_expression.clone());

        Self {
            name: desc.name,
            logical_type,
            nullable,
            default_expression,
            store_type: desc.column_type,
            insertable: !computed,
        }
    }
}

/// Column set of one destination, in declaration order
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    columns: Vec<ColumnSchema>,
    index: HashMap<String, usize>,
}

impl TableSchema {
    /// Build from introspection rows
    pub fn from_descriptions(rows: Vec<ColumnDescription>) -> Self {
        Self::new(rows.into_iter().map(ColumnSchema::from).collect())
    }

    /// Build from already-classified columns
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self { columns, index }
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// All columns in declaration order
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
