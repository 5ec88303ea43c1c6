//! Semantic analyzer tests: typing rules, scope rules, flow checks, and
//! literal reduction, driven through the compile pipeline.

use ruleslang::{expand_operators, parse, Analyzer, SemProgram, SourceError};

fn analyze(source: &str) -> Result<SemProgram, SourceError> {
    let mut statements = parse(source)?;
    expand_operators(&mut statements);
    Analyzer::new_program().analyze_program(&statements)
}

fn analyze_err(source: &str) -> String {
    analyze(source).expect_err("expected a semantic error").message
}

// ==================== Declarations and scopes ====================

#[test]
fn test_declaration_typing() {
    assert!(analyze("let sint32 a = 100").is_ok());
    assert!(analyze("let uint8 b = 200").is_ok());
    assert!(analyze("var fp64 x = 1.5").is_ok());
    // 300 does not fit uint8
    assert_eq!(analyze_err("let uint8 b = 300"), "Cannot convert sint literal 300 to uint8");
}

#[test]
fn test_same_scope_collision() {
    assert_eq!(
        analyze_err("let a = 1\nlet a = 2"),
        "Name already defined in this scope"
    );
}

#[test]
fn test_inner_shadowing_allowed() {
    assert!(analyze("let a = 1\nif true:\n  let a = 2\n  b = a\nvar b = 0").is_err());
    // shadowing itself is fine; the error above is the forward use of b
    assert!(analyze("var b = 0\nlet a = 1\nif true:\n  let a = 2\n  b = a").is_ok());
}

#[test]
fn test_assignment_rules() {
    assert_eq!(
        analyze_err("let a = 1\na = 2"),
        "Cannot assign to an immutable variable"
    );
    assert_eq!(analyze_err("unknown = 1"), "Unknown name");
    assert_eq!(analyze_err("var sint8 a\na = 9999"), "Cannot convert sint literal 9999 to sint8");
}

#[test]
fn test_null_needs_a_type() {
    assert_eq!(
        analyze_err("let a = null"),
        "Cannot infer a type from null; declare one"
    );
    assert!(analyze("def P {x: sint64}\nlet P p = null").is_ok());
}

// ==================== Conditions and loops ====================

#[test]
fn test_conditions_must_be_bool() {
    assert_eq!(
        analyze_err("if 1:\n  var a = 0"),
        "Condition must be bool, found sint literal 1"
    );
    assert_eq!(
        analyze_err("while 1:\n  var a = 0"),
        "Condition must be bool, found sint literal 1"
    );
}

#[test]
fn test_jumps_need_loops() {
    assert_eq!(analyze_err("break"), "'break' outside of a loop");
    assert_eq!(analyze_err("continue"), "'continue' outside of a loop");
    assert_eq!(
        analyze_err("outer: while true:\n  break wrong"),
        "Unknown loop label"
    );
    assert!(analyze("outer: while true:\n  while true:\n    break outer").is_ok());
}

// ==================== Functions ====================

#[test]
fn test_all_paths_must_return() {
    let err = analyze_err(
        "func sign(sint64 x) sint64:\n  if x < 0:\n    return 0 - 1",
    );
    assert_eq!(err, "Not every path through this function returns a value");
    assert!(analyze(
        "func sign(sint64 x) sint64:\n  if x < 0:\n    return 0 - 1\n  else:\n    return 1"
    )
    .is_ok());
}

#[test]
fn test_return_type_checks() {
    assert_eq!(
        analyze_err("func f() sint8:\n  return 300"),
        "Cannot convert sint literal 300 to sint8"
    );
    assert_eq!(
        analyze_err("func f():\n  return 1"),
        "This function does not return a value"
    );
}

#[test]
fn test_overload_resolution() {
    let source = "func f(sint8 x) sint64:\n  return 8\n\
                  func f(sint64 x) sint64:\n  return 64\n\
                  let a = f(1)";
    assert!(analyze(source).is_ok());
    assert_eq!(
        analyze_err("func f(sint64 x) sint64:\n  return 1\nlet a = f(true)"),
        "No matching call"
    );
    assert_eq!(analyze_err("let a = g(1)"), "Unknown function");
}

#[test]
fn test_mutually_convertible_overloads_are_ambiguous() {
    // Reordered structures are distinct types yet convert both ways, so
    // neither overload is uniquely most specific.
    let source = "def A {a: sint32, b: bool}\n\
                  def B {b: bool, a: sint32}\n\
                  func f(A x) sint64:\n  return 1\n\
                  func f(B x) sint64:\n  return 2\n\
                  let v = A {a: 1, b: true}\n\
                  let r = f(v)";
    assert_eq!(analyze_err(source), "Ambiguous call");
}

#[test]
fn test_duplicate_signature_rejected() {
    let err = analyze_err(
        "func f(sint64 x) sint64:\n  return 1\nfunc f(sint64 y) sint64:\n  return 2",
    );
    assert_eq!(err, "A function with this signature is already defined");
}

#[test]
fn test_no_closures_over_locals() {
    assert_eq!(
        analyze_err("let a = 1\nfunc f() sint64:\n  return a"),
        "Unknown name"
    );
}

#[test]
fn test_infix_resolves_to_binary_function() {
    let source = "func max(sint64 a, sint64 b) sint64:\n  \
                  if a < b:\n    return b\n  else:\n    return a\n\
                  let m = 3 max 4";
    assert!(analyze(source).is_ok());
}

// ==================== Types ====================

#[test]
fn test_cyclic_type_definition_rejected() {
    assert_eq!(analyze_err("def A A"), "Cyclic type definition");
    assert_eq!(
        analyze_err("def Node {next: Node}"),
        "Cyclic type definition"
    );
}

#[test]
fn test_unknown_type_name() {
    assert_eq!(analyze_err("let Missing m = 1"), "Unknown type name");
    assert_eq!(analyze_err("def T Missing"), "Unknown type name");
}

#[test]
fn test_structure_widening() {
    let source = "def Wide {a: sint32, b: bool}\n\
                  def Narrow {b: bool}\n\
                  let w = Wide {a: 1, b: true}\n\
                  let Narrow n = w";
    assert!(analyze(source).is_ok());
    let reverse = "def Wide {a: sint32, b: bool}\n\
                   def Narrow {b: bool}\n\
                   let n = Narrow {b: true}\n\
                   let Wide w = n";
    assert!(analyze(reverse).is_err());
}

#[test]
fn test_tuple_and_struct_indices_are_static() {
    let source = "def Pair {sint64, bool}\nlet p = Pair {1, true}\nvar i = 0\nlet x = p[i]";
    assert_eq!(
        analyze(source).unwrap_err().message,
        "Tuple and structure indices must be constant integers"
    );
}

#[test]
fn test_range_bounds_must_be_constant() {
    assert_eq!(
        analyze_err("var n = 4\nlet r = 1 .. n"),
        "Range bounds must be constant integers"
    );
    assert!(analyze("let r = 1 .. 4").is_ok());
}

// ==================== Literal reduction ====================

#[test]
fn test_literal_overflow_is_a_semantic_error() {
    assert_eq!(
        analyze_err("let a = 9223372036854775807 + 9223372036854775807 + 9223372036854775807"),
        "Arithmetic overflow in constant expression"
    );
    assert_eq!(
        analyze_err("let a = 1 / 0"),
        "Division by zero in constant expression"
    );
}

#[test]
fn test_negative_sint64_boundary() {
    // 9223372036854775808 lexes unsigned; the sign folds it into range.
    assert!(analyze("let a = -9223372036854775808").is_ok());
    assert!(analyze("let sint64 a = -9223372036854775808").is_ok());
    assert_eq!(
        analyze_err("let sint64 a = 9223372036854775808"),
        "Cannot convert uint literal 9223372036854775808 to sint64"
    );
}

#[test]
fn test_reduction_idempotent() {
    use ruleslang::sem::reduce::reduce;

    let mut statements = parse("let a = 1 + 2 * 3 - 4").unwrap();
    expand_operators(&mut statements);
    let program = Analyzer::new_program().analyze_program(&statements).unwrap();
    let ruleslang::sem::SemStmtKind::Declare { value: Some(value), .. } =
        &program.statements[0].kind
    else {
        panic!("expected a declaration");
    };
    let once = reduce(value.clone()).unwrap();
    let twice = reduce(once.clone()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, *value);
}

#[test]
fn test_string_literal_concat_folds() {
    assert!(analyze("let s = \"ab\" ~ \"cd\"").is_ok());
    // the folded literal keeps its length: 4 utf8 units
    assert!(analyze("let uint8[4] cs = \"ab\" ~ \"cd\"").is_ok());
    assert!(analyze("let uint8[5] cs = \"ab\" ~ \"cd\"").is_err());
}

#[test]
fn test_type_compare_folds_statically() {
    assert!(analyze("let sint32 x = 1\nlet t = x :: sint32").is_ok());
    assert!(analyze("let sint32 x = 1\nlet t = x <: sint64").is_ok());
}
