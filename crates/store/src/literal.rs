//! Store literal rendering
//!
//! Raw field values arrive as weakly typed JSON. These functions apply the
//! permissive conversion rules and produce text that can be spliced into a
//! `VALUES` tuple. Output never contains a raw newline, carriage return or
//! tab, so a staged row always fits on one line.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// SQL null literal
pub const NULL_LITERAL: &str = "NULL";

/// String values are cut to this many characters before quoting
pub const MAX_STRING_CHARS: usize = 240;

/// Leading decimal number, optionally signed, with optional exponent
static NUMERIC_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?)").unwrap());

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Weak truthiness of a raw value
///
/// `null`, `false`, `0`, `0.0`, `""`, `"0"` and empty arrays/objects are falsy.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// True for arrays and objects
pub fn is_non_scalar(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Integer literal; numbers truncate toward zero, strings use their numeric prefix
pub fn int_literal(value: &Value) -> String {
    match value {
        Value::Null => "0".to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                truncate_float(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => int_from_str(s),
        Value::Array(_) | Value::Object(_) => "0".to_string(),
    }
}

fn int_from_str(s: &str) -> String {
    let Some(prefix) = numeric_prefix(s) else {
        return "0".to_string();
    };
    if let Ok(i) = prefix.parse::<i128>() {
        return i.to_string();
    }
    truncate_float(prefix.parse::<f64>().unwrap_or(0.0))
}

fn truncate_float(f: f64) -> String {
    if f.is_finite() {
        // `as` saturates at the i128 bounds
        (f.trunc() as i128).to_string()
    } else {
        "0".to_string()
    }
}

/// Float literal; same rules as [`int_literal`] without truncation
pub fn float_literal(value: &Value) -> String {
    let f = match value {
        Value::Null | Value::Array(_) | Value::Object(_) => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return n.to_string();
            }
            n.as_f64().unwrap_or(0.0)
        }
        Value::String(s) => numeric_prefix(s)
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0),
    };
    if f.is_finite() {
        f.to_string()
    } else {
        "0".to_string()
    }
}

fn numeric_prefix(s: &str) -> Option<&str> {
    NUMERIC_PREFIX
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_start_matches('+'))
}

/// String literal: weak string form, sanitized, truncated and quoted
pub fn string_literal(value: &Value) -> String {
    let text = match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => String::new(),
    };

    let stripped = MARKUP_TAG.replace_all(&text, "");
    let unquoted: String = stripped
        .chars()
        .filter(|&c| c != '\'')
        .take(MAX_STRING_CHARS)
        .collect();

    quote(&unquoted, false)
}

/// Literal for a column whose type the coercer doesn't model
pub fn passthrough_literal(value: &Value) -> String {
    match value {
        Value::Null => NULL_LITERAL.to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s, true),
        Value::Array(_) | Value::Object(_) => NULL_LITERAL.to_string(),
    }
}

/// Escape backslashes and control characters, then wrap in single quotes
fn quote(s: &str, escape_quotes: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' if escape_quotes => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
#[path = "literal_test.rs"]
mod literal_test;
