//! Evaluator tests, driven through a shell session: statements execute
//! against the persistent frame, expressions report their value.

use ruleslang::ShellSession;

/// Run statements, then evaluate one expression and return the shell's
/// `value:` line.
fn eval_in(statements: &[&str], expression: &str) -> String {
    let mut session = ShellSession::new();
    for statement in statements {
        session
            .submit(statement)
            .unwrap_or_else(|e| panic!("statement failed: {}\n{}", statement, e));
    }
    session.toggle_mode();
    let output = session
        .submit(expression)
        .unwrap_or_else(|e| panic!("expression failed: {}\n{}", expression, e));
    output
        .lines()
        .find_map(|line| line.strip_prefix("value: "))
        .expect("no value line")
        .to_string()
}

fn eval_err(statements: &[&str], expression: &str) -> String {
    let mut session = ShellSession::new();
    for statement in statements {
        session.submit(statement).expect("statement failed");
    }
    session.toggle_mode();
    session.submit(expression).expect_err("expected an error")
}

#[test]
fn test_expression_mode_prints_type_and_value() {
    let mut session = ShellSession::new();
    session.toggle_mode();
    let output = session.submit("1 + 2").unwrap();
    assert!(output.contains("type: sint64"), "output: {}", output);
    assert!(output.contains("value: 3"), "output: {}", output);
}

#[test]
fn test_statement_mode_prints_stack_size() {
    let mut session = ShellSession::new();
    let output = session.submit("let sint32 a = 7").unwrap();
    // 8 bytes of input slot, then a 4-byte slot
    assert_eq!(output, "stack: 12");
}

#[test]
fn test_arithmetic_and_variables() {
    assert_eq!(eval_in(&["var sint32 a = 6", "a = a * 7"], "a"), "42");
    assert_eq!(eval_in(&["var a = 10", "a -= 3"], "a"), "7");
    assert_eq!(eval_in(&[], "2 ** 10"), "1024");
    assert_eq!(eval_in(&[], "7 % 3"), "1");
    assert_eq!(eval_in(&[], "1.5 + 2.25"), "3.75");
}

#[test]
fn test_comparison_chain() {
    assert_eq!(eval_in(&["var a = 2"], "1 < a <= 2"), "true");
    assert_eq!(eval_in(&["var a = 5"], "1 < a <= 2"), "false");
    assert_eq!(eval_in(&[], "true && false || true"), "true");
}

#[test]
fn test_while_loop_with_compound_assignment() {
    let statements = [
        "var i = 0",
        "var total = 0",
        "while i < 5:\n  total += i\n  i += 1",
    ];
    assert_eq!(eval_in(&statements, "total"), "10");
}

#[test]
fn test_labeled_break() {
    let statements = [
        "var hits = 0",
        "var i = 0",
        "outer: while i < 3:\n  var j = 0\n  while j < 3:\n    hits += 1\n    \
         if hits == 4:\n      break outer\n    j += 1\n  i += 1",
    ];
    assert_eq!(eval_in(&statements, "hits"), "4");
}

#[test]
fn test_continue_skips() {
    let statements = [
        "var evens = 0",
        "var i = 0",
        "while i < 10:\n  i += 1\n  if i % 2 == 1:\n    continue\n  evens += 1",
    ];
    assert_eq!(eval_in(&statements, "evens"), "5");
}

#[test]
fn test_functions_and_recursion() {
    let statements = ["func fact(sint64 n) sint64:\n  if n <= 1:\n    return 1\n  \
                      else:\n    return n * fact(n - 1)"];
    assert_eq!(eval_in(&statements, "fact(5)"), "120");
}

#[test]
fn test_function_arguments_bind_in_order() {
    let statements =
        ["func sub(sint64 a, sint64 b) sint64:\n  return a - b"];
    assert_eq!(eval_in(&statements, "sub(10, 4)"), "6");
}

#[test]
fn test_overload_picks_most_specific() {
    let statements = [
        "func width(sint8 x) sint64:\n  return 8",
        "func width(sint64 x) sint64:\n  return 64",
        "var sint64 big = 1000",
    ];
    assert_eq!(eval_in(&statements, "width(1)"), "8");
    assert_eq!(eval_in(&statements, "width(big)"), "64");
}

#[test]
fn test_infix_call() {
    let statements = ["func max(sint64 a, sint64 b) sint64:\n  \
                      if a < b:\n    return b\n  else:\n    return a"];
    assert_eq!(eval_in(&statements, "3 max 7 max 5"), "7");
}

#[test]
fn test_conditional_expression() {
    assert_eq!(eval_in(&["var a = 5"], "1 if a > 3 else 2"), "1");
    assert_eq!(eval_in(&["var a = 1"], "1 if a > 3 else 2"), "2");
}

#[test]
fn test_struct_literal_and_field_access() {
    let statements = [
        "def Point {x: sint32, y: sint32}",
        "let p = Point {x: 3, y: 4}",
    ];
    assert_eq!(eval_in(&statements, "p.x * p.x + p.y * p.y"), "25");
    assert_eq!(eval_in(&statements, "p"), "{x: 3, y: 4}");
}

#[test]
fn test_struct_defaulting_zero_fills() {
    let statements = [
        "def Point {x: sint32, y: sint32}",
        "let p = Point {y: 9}",
    ];
    assert_eq!(eval_in(&statements, "p"), "{x: 0, y: 9}");
}

#[test]
fn test_array_literal_with_other() {
    let statements = [
        "def Quad sint64[4]",
        "let xs = Quad {1, 2, other: 9}",
    ];
    assert_eq!(eval_in(&statements, "xs"), "{1, 2, 9, 9}");
    assert_eq!(eval_in(&statements, "xs[3]"), "9");
}

#[test]
fn test_other_value_evaluated_once() {
    // Every slot filled by "other" holds the same object, so the catch-all
    // expression ran exactly once.
    let statements = [
        "def Pair {sint64, sint64}",
        "def Pairs Pair[3]",
        "let ps = Pairs {other: Pair {1, 2}}",
    ];
    assert_eq!(eval_in(&statements, "ps[0] === ps[1]"), "true");
    assert_eq!(eval_in(&statements, "ps[1] === ps[2]"), "true");
}

#[test]
fn test_tuple_access_by_position() {
    let statements = ["def Pair {sint64, bool}", "let p = Pair {42, true}"];
    assert_eq!(eval_in(&statements, "p[0]"), "42");
    assert_eq!(eval_in(&statements, "p[1]"), "true");
}

#[test]
fn test_array_index_assignment() {
    let statements = [
        "def Quad sint64[4]",
        "var xs = Quad {other: 0}",
        "xs[2] = 5",
    ];
    assert_eq!(eval_in(&statements, "xs"), "{0, 0, 5, 0}");
}

#[test]
fn test_struct_field_assignment() {
    let statements = [
        "def Point {x: sint32, y: sint32}",
        "var p = Point {x: 1, y: 2}",
        "p.x = 10",
    ];
    assert_eq!(eval_in(&statements, "p.x"), "10");
}

#[test]
fn test_structure_widening_reorders_by_name() {
    let statements = [
        "def Wide {a: sint32, b: bool}",
        "def Narrow {b: bool}",
        "let w = Wide {a: 7, b: true}",
        "let Narrow n = w",
        "let Narrow n2 = w",
    ];
    assert_eq!(eval_in(&statements, "n.b"), "true");
    // widening to a reordered subset shares the original object
    assert_eq!(eval_in(&statements, "n === n2"), "true");
}

#[test]
fn test_strings() {
    assert_eq!(eval_in(&["let s = \"abc\""], "s"), "\"abc\"");
    assert_eq!(eval_in(&[], "\"ab\" ~ \"cd\""), "\"abcd\"");
    assert_eq!(eval_in(&["let s = \"abc\""], "s == \"abc\""), "true");
    assert_eq!(eval_in(&[], "\"a\\u0041\""), "\"aA\"");
}

#[test]
fn test_string_indexing_yields_units() {
    assert_eq!(eval_in(&["let s = \"abc\""], "s[1]"), "98");
}

#[test]
fn test_array_concatenation() {
    let statements = [
        "def Two sint64[2]",
        "let a = Two {1, 2}",
        "let b = Two {3, 4}",
    ];
    assert_eq!(eval_in(&statements, "a ~ b"), "{1, 2, 3, 4}");
}

#[test]
fn test_range_reduces_to_array() {
    assert_eq!(eval_in(&[], "1 .. 5"), "{1, 2, 3, 4}");
    assert_eq!(eval_in(&[], "3 .. 3"), "{}");
}

#[test]
fn test_bitwise_and_shifts() {
    assert_eq!(eval_in(&["var sint64 a = 12"], "a & 10"), "8");
    assert_eq!(eval_in(&["var sint64 a = 12"], "a | 3"), "15");
    assert_eq!(eval_in(&["var sint64 a = 1"], "a << 10"), "1024");
    assert_eq!(eval_in(&["var sint64 a = -8"], "a >> 1"), "-4");
    assert_eq!(eval_in(&["var sint8 a = -1"], "a >>> 4"), "15");
}

#[test]
fn test_null_reference_error() {
    let err = eval_err(
        &["def P {x: sint64}", "let P p = null"],
        "p.x",
    );
    assert!(err.contains("Null reference"), "error: {}", err);
}

#[test]
fn test_division_by_zero_error() {
    let err = eval_err(&["var a = 0"], "1 / a");
    assert!(err.contains("Division by zero"), "error: {}", err);
}

#[test]
fn test_index_out_of_bounds_error() {
    let err = eval_err(
        &["def Quad sint64[4]", "let xs = Quad {other: 0}", "var i = 9"],
        "xs[i]",
    );
    assert!(err.contains("out of bounds"), "error: {}", err);
}

#[test]
fn test_static_field_access_not_implemented() {
    let err = eval_err(&["def Point {x: sint32}"], "Point.x");
    assert!(err.contains("value not implemented"), "error: {}", err);
}

#[test]
fn test_shell_state_persists() {
    let mut session = ShellSession::new();
    session.submit("var total = 1").unwrap();
    session.submit("total += 41").unwrap();
    session.toggle_mode();
    let output = session.submit("total").unwrap();
    assert!(output.contains("value: 42"), "output: {}", output);
}

#[test]
fn test_mode_toggle_round_trip() {
    let mut session = ShellSession::new();
    assert!(!session.expression_mode());
    session.toggle_mode();
    assert!(session.expression_mode());
    session.toggle_mode();
    assert!(!session.expression_mode());
}
