//! End-to-end rule tests: compile, describe the input, run against JSON.

use ruleslang::{Rule, RuleError};
use serde_json::json;

#[test]
fn test_struct_input_sum() {
    let rule = Rule::compile("def Input {a: sint32, b: sint32}\nreturn .a + .b").unwrap();
    let output = rule.run(&json!({"a": 2, "b": 3})).unwrap();
    assert_eq!(output, json!(5));
}

#[test]
fn test_input_descriptor() {
    let rule = Rule::compile("def Input {a: sint32, b: sint32}\nreturn .a + .b").unwrap();
    assert_eq!(
        rule.input_format(),
        json!({"struct": {"a": "sint32", "b": "sint32"}})
    );
}

#[test]
fn test_not_applicable_yields_null() {
    let rule = Rule::compile(
        "def Input {amount: sint64}\nif .amount > 100:\n  return .amount",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"amount": 500})).unwrap(), json!(500));
    assert_eq!(rule.run(&json!({"amount": 5})).unwrap(), json!(null));
}

#[test]
fn test_bare_return_is_not_applicable() {
    let rule = Rule::compile(
        "def Input {flag: bool}\nif .flag:\n  return\nreturn 1",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"flag": true})).unwrap(), json!(null));
    assert_eq!(rule.run(&json!({"flag": false})).unwrap(), json!(1));
}

#[test]
fn test_rule_without_input_type() {
    let rule = Rule::compile("return 6 * 7").unwrap();
    assert_eq!(rule.input_format(), json!({"struct": {}}));
    assert_eq!(rule.run(&json!({})).unwrap(), json!(42));
}

#[test]
fn test_composite_output() {
    let rule = Rule::compile(
        "def Input {x: sint32, y: sint32}\n\
         def Point {x: sint32, y: sint32}\n\
         return Point {x: .y, y: .x}",
    )
    .unwrap();
    assert_eq!(
        rule.run(&json!({"x": 1, "y": 2})).unwrap(),
        json!({"x": 2, "y": 1})
    );
}

#[test]
fn test_array_input_and_output() {
    let rule = Rule::compile(
        "def Input {xs: sint64[3]}\nreturn .xs ~ .xs",
    )
    .unwrap();
    assert_eq!(
        rule.run(&json!({"xs": [1, 2, 3]})).unwrap(),
        json!([1, 2, 3, 1, 2, 3])
    );
}

#[test]
fn test_string_output() {
    let rule = Rule::compile("return \"fee\" ~ \"fi\"").unwrap();
    assert_eq!(rule.run(&json!({})).unwrap(), json!("feefi"));
}

#[test]
fn test_functions_in_rules() {
    let rule = Rule::compile(
        "def Input {n: sint64}\n\
         func fib(sint64 n) sint64:\n\
         \x20 if n <= 1:\n\
         \x20   return n\n\
         \x20 else:\n\
         \x20   return fib(n - 1) + fib(n - 2)\n\
         return fib(.n)",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"n": 10})).unwrap(), json!(55));
}

#[test]
fn test_missing_field_is_an_input_error() {
    let rule = Rule::compile("def Input {a: sint32}\nreturn .a").unwrap();
    let error = rule.run(&json!({})).unwrap_err();
    assert!(matches!(error, RuleError::Input(_)), "error: {}", error);
}

#[test]
fn test_input_range_check() {
    let rule = Rule::compile("def Input {a: uint8}\nreturn .a").unwrap();
    assert_eq!(rule.run(&json!({"a": 200})).unwrap(), json!(200));
    assert!(rule.run(&json!({"a": 300})).is_err());
}

#[test]
fn test_runtime_error_propagates() {
    let rule = Rule::compile("def Input {d: sint64}\nreturn 10 / .d").unwrap();
    assert_eq!(rule.run(&json!({"d": 2})).unwrap(), json!(5));
    let error = rule.run(&json!({"d": 0})).unwrap_err();
    assert!(matches!(error, RuleError::Source(_)), "error: {}", error);
    assert!(error.to_string().contains("Division by zero"));
}

#[test]
fn test_null_input_member() {
    let rule = Rule::compile(
        "def Inner {v: sint64}\n\
         def Input {inner: Inner}\n\
         if .inner == null:\n\
         \x20 return 0 - 1\n\
         return .inner.v",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"inner": {"v": 9}})).unwrap(), json!(9));
    assert_eq!(rule.run(&json!({"inner": null})).unwrap(), json!(-1));
}

#[test]
fn test_compile_error_carries_span() {
    let error = Rule::compile("let a = ").unwrap_err();
    let rendered = error.format_with_source("let a = ");
    assert!(rendered.starts_with("Error: \""), "rendered: {}", rendered);
    assert!(rendered.contains("at line: 1"), "rendered: {}", rendered);
}
