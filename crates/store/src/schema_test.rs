//! Tests for schema classification

use super::*;

// =============================================================================
// Type classification
// =============================================================================

#[test]
fn test_integer_types() {
    for ty in ["Int8", "Int64", "UInt32", "UInt256", "Bool"] {
        assert_eq!(LogicalType::from_store_type(ty), LogicalType::Int, "{ty}");
    }
}

#[test]
fn test_float_types() {
    for ty in ["Float32", "Float64", "Decimal(18, 4)", "Decimal64(3)"] {
        assert_eq!(LogicalType::from_store_type(ty), LogicalType::Float, "{ty}");
    }
}

#[test]
fn test_string_types() {
    for ty in [
        "String",
        "FixedString(16)",
        "Date",
        "DateTime('UTC')",
        "DateTime64(3, 'UTC')",
        "UUID",
        "Enum8('a' = 1, 'b' = 2)",
        "IPv6",
    ] {
        assert_eq!(LogicalType::from_store_type(ty), LogicalType::String, "{ty}");
    }
}

#[test]
fn test_other_types_pass_through() {
    for ty in ["Array(String)", "Map(String, UInt64)", "JSON", "Tuple(a UInt8)"] {
        assert_eq!(
            LogicalType::from_store_type(ty),
            LogicalType::Passthrough,
            "{ty}"
        );
    }
}

#[test]
fn test_unwrap_modifiers() {
    assert_eq!(unwrap_modifiers("UInt64"), ("UInt64", false));
    assert_eq!(unwrap_modifiers("Nullable(String)"), ("String", true));
    assert_eq!(
        unwrap_modifiers("LowCardinality(Nullable(String))"),
        ("String", true)
    );
    assert_eq!(unwrap_modifiers("LowCardinality(String)"), ("String", false));
}

// =============================================================================
// Column schema
// =============================================================================

#[test]
fn test_column_from_description() {
    let column = ColumnSchema::from(ColumnDescription::new(
        "country",
        "LowCardinality(Nullable(String))",
    ));
    assert_eq!(column.name, "country");
    assert_eq!(column.logical_type, LogicalType::String);
    assert!(column.nullable);
    assert!(column.insertable);
    assert_eq!(column.default_expression, None);
    assert_eq!(column.store_type, "LowCardinality(Nullable(String))");
}

#[test]
fn test_default_expression_kept() {
    let column = ColumnSchema::from(
        ColumnDescription::new("created", "DateTime").with_default("DEFAULT", "now()"),
    );
    assert!(column.insertable);
    assert_eq!(column.default_expression.as_deref(), Some("now()"));
}

#[test]
fn test_computed_columns_not_insertable() {
    for kind in ["MATERIALIZED", "ALIAS"] {
        let column = ColumnSchema::from(
            ColumnDescription::new("day", "Date").with_default(kind, "toDate(created)"),
        );
        assert!(!column.insertable, "{kind}");
        assert_eq!(column.default_expression, None);
    }
}

#[test]
fn test_table_schema_lookup() {
    let schema = TableSchema::from_descriptions(vec![
        ColumnDescription::new("id", "UInt64"),
        ColumnDescription::new("name", "String"),
    ]);
    assert_eq!(schema.len(), 2);
    assert_eq!(schema.column("name").map(|c| c.logical_type), Some(LogicalType::String));
    assert!(schema.column("missing").is_none());
    assert_eq!(schema.columns()[0].name, "id");
}
