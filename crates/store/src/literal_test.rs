//! Tests for literal rendering

use serde_json::json;

use super::*;

#[test]
fn test_falsy_values() {
    for v in [
        json!(null),
        json!(false),
        json!(0),
        json!(0.0),
        json!(""),
        json!("0"),
        json!([]),
        json!({}),
    ] {
        assert!(is_falsy(&v), "{v}");
    }
    for v in [json!(true), json!(1), json!("0.0"), json!(" "), json!([0])] {
        assert!(!is_falsy(&v), "{v}");
    }
}

// =============================================================================
// int
// =============================================================================

#[test]
fn test_int_from_numbers() {
    assert_eq!(int_literal(&json!(42)), "42");
    assert_eq!(int_literal(&json!(-7)), "-7");
    assert_eq!(int_literal(&json!(3.9)), "3");
    assert_eq!(int_literal(&json!(-3.9)), "-3");
    assert_eq!(int_literal(&json!(u64::MAX)), u64::MAX.to_string());
}

#[test]
fn test_int_from_strings() {
    assert_eq!(int_literal(&json!("12abc")), "12");
    assert_eq!(int_literal(&json!("abc")), "0");
    assert_eq!(int_literal(&json!("  -5")), "-5");
    assert_eq!(int_literal(&json!("+8")), "8");
    assert_eq!(int_literal(&json!("2.75kg")), "2");
    assert_eq!(int_literal(&json!("1e3")), "1000");
    assert_eq!(int_literal(&json!("")), "0");
}

#[test]
fn test_int_from_other_scalars() {
    assert_eq!(int_literal(&json!(true)), "1");
    assert_eq!(int_literal(&json!(false)), "0");
    assert_eq!(int_literal(&json!(null)), "0");
}

// =============================================================================
// float
// =============================================================================

#[test]
fn test_float_literals() {
    assert_eq!(float_literal(&json!(1.5)), "1.5");
    assert_eq!(float_literal(&json!(10)), "10");
    assert_eq!(float_literal(&json!("3.25 EUR")), "3.25");
    assert_eq!(float_literal(&json!(".5")), "0.5");
    assert_eq!(float_literal(&json!("n/a")), "0");
    assert_eq!(float_literal(&json!(true)), "1");
    assert_eq!(float_literal(&json!("1e999")), "0");
}

// =============================================================================
// string
// =============================================================================

#[test]
fn test_string_weak_forms() {
    assert_eq!(string_literal(&json!("hello")), "'hello'");
    assert_eq!(string_literal(&json!(12)), "'12'");
    assert_eq!(string_literal(&json!(1.5)), "'1.5'");
    assert_eq!(string_literal(&json!(true)), "'1'");
    assert_eq!(string_literal(&json!(false)), "''");
    assert_eq!(string_literal(&json!(null)), "''");
}

#[test]
fn test_string_sanitizing() {
    assert_eq!(string_literal(&json!("<b>bold</b> move")), "'bold move'");
    assert_eq!(string_literal(&json!("it's")), "'its'");
    assert_eq!(string_literal(&json!("a\\b")), "'a\\\\b'");
    assert_eq!(string_literal(&json!("line\nnext\tcol\r")), "'line\\nnext\\tcol\\r'");
}

#[test]
fn test_string_truncated_before_escaping() {
    let long = "é".repeat(300);
    let literal = string_literal(&json!(long));
    assert_eq!(literal.chars().count(), MAX_STRING_CHARS + 2);

    let newlines = "\n".repeat(300);
    let literal = string_literal(&json!(newlines));
    assert_eq!(literal.len(), MAX_STRING_CHARS * 2 + 2);
}

#[test]
fn test_literals_stay_on_one_line() {
    for v in [json!("a\nb"), json!("a\tb"), json!("\r\n")] {
        for literal in [string_literal(&v), passthrough_literal(&v)] {
            assert!(!literal.contains(['\n', '\r', '\t']), "{literal}");
        }
    }
}

// =============================================================================
// passthrough
// =============================================================================

#[test]
fn test_passthrough_literals() {
    assert_eq!(passthrough_literal(&json!("['a','b']")), "'[\\'a\\',\\'b\\']'");
    assert_eq!(passthrough_literal(&json!(2.5)), "2.5");
    assert_eq!(passthrough_literal(&json!(true)), "1");
    assert_eq!(passthrough_literal(&json!(null)), NULL_LITERAL);
}
