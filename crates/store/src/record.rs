//! Records on their way from the broker to the store
//!
//! A [`RawRecord`] is what a message decodes to. A [`CoercedRow`] is the same
//! record after coercion and defaulting, ready to be staged. A staged line
//! carries its own column list so a loader never depends on the schema that
//! was current when the row was written:
//!
//! ```text
//! ["created","id","name"]\t(now(),42,'ada')
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Destination names become file names and SQL identifiers
pub fn is_valid_destination(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// One decoded inbound record
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub destination: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(destination: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            destination: destination.into(),
            fields,
        }
    }
}

/// Coerced literals keyed by column, in lexicographic column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercedRow {
    values: BTreeMap<String, String>,
}

impl CoercedRow {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Column names in row order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Literal for a column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rendered `(v1,v2,...)` tuple
    pub fn tuple(&self) -> String {
        let mut out = String::with_capacity(2 + self.values.values().map(|v| v.len() + 1).sum::<usize>());
        out.push('(');
        for (i, value) in self.values.values().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(value);
        }
        out.push(')');
        out
    }

    /// Staged line without the trailing newline
    pub fn to_line(&self) -> String {
        let columns: Vec<&str> = self.columns().collect();
        format!("{}\t{}", Value::from(columns), self.tuple())
    }
}

/// A row read back from a staging snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRow {
    pub columns: Vec<String>,
    pub tuple: String,
}

impl StagedRow {
    /// Parse one staged line; `None` for anything malformed
    pub fn parse(line: &str) -> Option<Self> {
        let (header, tuple) = line.split_once('\t')?;
        let columns: Vec<String> = serde_json::from_str(header).ok()?;
        if columns.is_empty() || !tuple.starts_with('(') || !tuple.ends_with(')') {
            return None;
        }
        Some(Self {
            columns,
            tuple: tuple.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> CoercedRow {
        CoercedRow::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_destination_names() {
        assert!(is_valid_destination("events"));
        assert!(is_valid_destination("Events_2024"));
        assert!(!is_valid_destination(""));
        assert!(!is_valid_destination("../etc"));
        assert!(!is_valid_destination("events.sql"));
        assert!(!is_valid_destination("my table"));
    }

    #[test]
    fn test_columns_are_lexicographic() {
        let row = row(&[("name", "'ada'"), ("id", "42"), ("created", "now()")]);
        let columns: Vec<&str> = row.columns().collect();
        assert_eq!(columns, ["created", "id", "name"]);
        assert_eq!(row.tuple(), "(now(),42,'ada')");
    }

    #[test]
    fn test_line_format() {
        let row = row(&[("id", "42"), ("name", "'ada'")]);
        assert_eq!(row.to_line(), "[\"id\",\"name\"]\t(42,'ada')");
    }

    #[test]
    fn test_staged_row_parse() {
        let line = row(&[("id", "1"), ("note", "'a\\tb'")]).to_line();
        let staged = StagedRow::parse(&line).unwrap();
        assert_eq!(staged.columns, ["id", "note"]);
        assert_eq!(staged.tuple, "(1,'a\\tb')");
    }

    #[test]
    fn test_staged_row_rejects_torn_lines() {
        assert!(StagedRow::parse("[\"id\",\"na").is_none());
        assert!(StagedRow::parse("[\"id\"]\t(4").is_none());
        assert!(StagedRow::parse("[]\t()").is_none());
        assert!(StagedRow::parse("").is_none());
    }
}
