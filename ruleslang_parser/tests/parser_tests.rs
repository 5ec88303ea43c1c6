//! Parser tests
//!
//! Structural checks over the syntactic tree via its display form, plus
//! indentation grammar errors and source round-trips.

use ruleslang_parser::{parse, parse_expression, Statement};

fn parse_one(source: &str) -> Statement {
    let mut statements = parse(source).expect("parse failed");
    assert_eq!(statements.len(), 1, "expected one statement: {:?}", statements);
    statements.remove(0)
}

fn expr_display(source: &str) -> String {
    parse_expression(source).expect("parse failed").to_string()
}

// ==================== Declarations ====================

#[test]
fn test_typed_declaration_with_add() {
    let statement = parse_one("let Test t = 1 + 1");
    assert_eq!(
        statement.to_string(),
        "VariableDeclaration(let Test t = Add(SignedIntegerLiteral(1) + SignedIntegerLiteral(1)))"
    );
}

#[test]
fn test_untyped_declaration_backtracks() {
    let statement = parse_one("let t = 1");
    assert_eq!(
        statement.to_string(),
        "VariableDeclaration(let t = SignedIntegerLiteral(1))"
    );
}

#[test]
fn test_var_without_value() {
    let statement = parse_one("var sint32 n");
    assert_eq!(statement.to_string(), "VariableDeclaration(var sint32 n)");
}

#[test]
fn test_declaration_with_array_type() {
    let statement = parse_one("let sint32[4] xs = {0, 1, 2, 3}");
    assert_eq!(
        statement.to_string(),
        "VariableDeclaration(let sint32[4] xs = CompositeLiteral({SignedIntegerLiteral(0), \
         SignedIntegerLiteral(1), SignedIntegerLiteral(2), SignedIntegerLiteral(3)}))"
    );
}

// ==================== Conditionals ====================

#[test]
fn test_if_else() {
    let statement = parse_one("if a == 0:\n  let b = 12\nelse:\n  d = 1");
    assert_eq!(
        statement.to_string(),
        "ConditionalStatement(if Compare(a == SignedIntegerLiteral(0)): \
         VariableDeclaration(let b = SignedIntegerLiteral(12)); \
         else: Assignment(d = SignedIntegerLiteral(1)))"
    );
}

#[test]
fn test_else_if_chain() {
    let statement = parse_one("if a:\n  x = 1\nelse if b:\n  x = 2\nelse:\n  x = 3");
    assert_eq!(
        statement.to_string(),
        "ConditionalStatement(if a: Assignment(x = SignedIntegerLiteral(1)); \
         else if b: Assignment(x = SignedIntegerLiteral(2)); \
         else: Assignment(x = SignedIntegerLiteral(3)))"
    );
}

// ==================== Indentation ====================

#[test]
fn test_dedent_below_block_level_fails() {
    let err = parse("func test():\n while true:\n  let a = 1\n  while false:\n let b = 1")
        .unwrap_err();
    assert_eq!(err.message, "Not enough indentation");
}

#[test]
fn test_mixed_indentation_fails() {
    let err = parse("if a:\n\t x = 1").unwrap_err();
    assert_eq!(err.message, "Mixed indentation");
}

#[test]
fn test_block_char_must_match_outer() {
    let err = parse("if a:\n\tif b:\n\t  x = 1").unwrap_err();
    assert_eq!(err.message, "Mixed indentation");
}

#[test]
fn test_wrong_indent_width_fails() {
    let err = parse("if a:\n  x = 1\n   y = 2").unwrap_err();
    assert_eq!(err.message, "Expected 0 of ' '");
}

#[test]
fn test_empty_block_fails() {
    let err = parse("if a:\nx = 1").unwrap_err();
    assert_eq!(err.message, "Not enough indentation");
}

#[test]
fn test_tab_indentation() {
    let statement = parse_one("if a:\n\tx = 1\n\ty = 2");
    assert_eq!(
        statement.to_string(),
        "ConditionalStatement(if a: Assignment(x = SignedIntegerLiteral(1)); \
         Assignment(y = SignedIntegerLiteral(2)))"
    );
}

#[test]
fn test_semicolon_continues_line() {
    let statements = parse("let a = 1; let b = 2").unwrap();
    assert_eq!(statements.len(), 2);
}

#[test]
fn test_blank_lines_between_statements() {
    let statements = parse("let a = 1\n\n  \nlet b = 2").unwrap();
    assert_eq!(statements.len(), 2);
}

#[test]
fn test_nested_blocks() {
    let statement = parse_one("while a:\n  while b:\n    x = 1\n  y = 2");
    assert_eq!(
        statement.to_string(),
        "LoopStatement(while a: LoopStatement(while b: Assignment(x = SignedIntegerLiteral(1))); \
         Assignment(y = SignedIntegerLiteral(2)))"
    );
}

// ==================== Functions and jumps ====================

#[test]
fn test_function_definition() {
    let statement = parse_one("func add(sint32 a, sint32 b) sint32:\n  return a + b");
    assert_eq!(
        statement.to_string(),
        "FunctionDefinition(func add(sint32 a, sint32 b) sint32: \
         ReturnStatement(return Add(a + b)))"
    );
}

#[test]
fn test_function_without_return_type() {
    let statement = parse_one("func go():\n  return");
    assert_eq!(
        statement.to_string(),
        "FunctionDefinition(func go(): ReturnStatement(return))"
    );
}

#[test]
fn test_labeled_loop_with_jumps() {
    let statement = parse_one("outer: while a:\n  break outer\n  continue");
    assert_eq!(
        statement.to_string(),
        "LoopStatement(outer: while a: BreakStatement(break outer); \
         ContinueStatement(continue))"
    );
}

#[test]
fn test_call_statement() {
    let statement = parse_one("report(1, 2)");
    assert_eq!(
        statement.to_string(),
        "FunctionCallStatement(FunctionCall(report(SignedIntegerLiteral(1), \
         SignedIntegerLiteral(2))))"
    );
}

#[test]
fn test_bare_expression_statement_fails() {
    let err = parse("a + 1").unwrap_err();
    assert_eq!(err.message, "Expected an assignment or a call");
}

// ==================== Type definitions ====================

#[test]
fn test_struct_type_definition() {
    let statement = parse_one("def Point {x: sint32, y: sint32}");
    assert_eq!(
        statement.to_string(),
        "TypeDefinition(def Point {x: sint32, y: sint32})"
    );
}

#[test]
fn test_tuple_type_definition() {
    let statement = parse_one("def Pair {sint32, fp64}");
    assert_eq!(statement.to_string(), "TypeDefinition(def Pair {sint32, fp64})");
}

#[test]
fn test_alias_type_definition() {
    let statement = parse_one("def Meters sint64");
    assert_eq!(statement.to_string(), "TypeDefinition(def Meters sint64)");
}

// ==================== Expressions ====================

#[test]
fn test_precedence_multiply_over_add() {
    assert_eq!(
        expr_display("1 + 2 * 3"),
        "Add(SignedIntegerLiteral(1) + Multiply(SignedIntegerLiteral(2) * SignedIntegerLiteral(3)))"
    );
}

#[test]
fn test_exponent_left_associative() {
    assert_eq!(
        expr_display("2 ** 3 ** 2"),
        "Exponent(Exponent(SignedIntegerLiteral(2) ** SignedIntegerLiteral(3)) ** \
         SignedIntegerLiteral(2))"
    );
}

#[test]
fn test_unary_binds_tighter_than_exponent_base() {
    assert_eq!(
        expr_display("-a ** 2"),
        "Exponent(Sign(-a) ** SignedIntegerLiteral(2))"
    );
}

#[test]
fn test_compare_chain_with_type_compare() {
    assert_eq!(
        expr_display("a < b <= c <: sint64"),
        "Compare(a < b <= c <: sint64)"
    );
}

#[test]
fn test_logical_and_bitwise_layering() {
    assert_eq!(
        expr_display("a & b && c | d"),
        "LogicalAnd(BitwiseAnd(a & b) && BitwiseOr(c | d))"
    );
}

#[test]
fn test_conditional_expression_right_associative() {
    assert_eq!(
        expr_display("a if c else b if d else e"),
        "Conditional(a if c else Conditional(b if d else e))"
    );
}

#[test]
fn test_range_and_concatenate() {
    assert_eq!(expr_display("1 .. 4"), "Range(SignedIntegerLiteral(1) .. SignedIntegerLiteral(4))");
    assert_eq!(
        expr_display("a ~ b ~ c"),
        "Concatenate(Concatenate(a ~ b) ~ c)"
    );
}

#[test]
fn test_infix_function() {
    assert_eq!(expr_display("a max b"), "Infix(a max b)");
    assert_eq!(
        expr_display("a max b max c"),
        "Infix(Infix(a max b) max c)"
    );
}

#[test]
fn test_access_chain() {
    // `p.x` is a dotted name; the postfix chain hangs off it.
    assert_eq!(
        expr_display("p.x[0](1).y"),
        "FieldAccess(FunctionCall(IndexAccess(p.x[SignedIntegerLiteral(0)])\
         (SignedIntegerLiteral(1))).y)"
    );
}

#[test]
fn test_context_field_access() {
    assert_eq!(expr_display(".amount"), "ContextFieldAccess(.amount)");
}

#[test]
fn test_integer_field_access_quirk() {
    // `1.x` lexes as float `1.` then identifier; the parser re-reads it.
    assert_eq!(
        expr_display("1.x"),
        "FieldAccess(SignedIntegerLiteral(1).x)"
    );
}

#[test]
fn test_initializer_and_composite() {
    assert_eq!(
        expr_display("Point {x: 1, y: 2}"),
        "Initializer(Point{x: SignedIntegerLiteral(1), y: SignedIntegerLiteral(2)})"
    );
    assert_eq!(
        expr_display("{1, 2, other: 9}"),
        "CompositeLiteral({SignedIntegerLiteral(1), SignedIntegerLiteral(2), \
         other: SignedIntegerLiteral(9)})"
    );
}

#[test]
fn test_nested_composite_literal() {
    assert_eq!(
        expr_display("{a: {1, 2}, b: 3}"),
        "CompositeLiteral({a: CompositeLiteral({SignedIntegerLiteral(1), \
         SignedIntegerLiteral(2)}), b: SignedIntegerLiteral(3)})"
    );
}

#[test]
fn test_null_literal() {
    assert_eq!(expr_display("null"), "NullLiteral(null)");
}

#[test]
fn test_dotted_name() {
    assert_eq!(expr_display("geo.origin"), "geo.origin");
}

// ==================== Round trips ====================

#[test]
fn test_source_round_trip() {
    let programs = [
        "let Test t = 1 + 1",
        "if a == 0:\n  let b = 12\nelse:\n  d = 1",
        "func add(sint32 a, sint32 b) sint32:\n  return a + b",
        "outer: while a < 10:\n  a += 1\n  break outer",
        "def Point {x: sint32, y: sint32}",
        "let p = Point {x: 1, y: 2}",
        "let xs = {1, 2, other: 9}",
        "x = a ~ b if c < d else e",
    ];
    for program in programs {
        let first = parse(program).expect("initial parse failed");
        let printed: Vec<String> = first.iter().map(|s| s.to_source(0)).collect();
        let printed = printed.join("\n");
        let second = parse(&printed).expect("re-parse of printed source failed");
        let reprinted: Vec<String> = second.iter().map(|s| s.to_source(0)).collect();
        assert_eq!(printed, reprinted.join("\n"), "printer unstable for {:?}", program);
    }
}

#[test]
fn test_spans_cover_tokens() {
    let source = "let total = price * count";
    for token in ruleslang_parser::tokenize(source).unwrap() {
        if token.is_eof() {
            assert_eq!(token.span.start, token.span.end);
        } else {
            assert_eq!(&source[token.span.start..token.span.end], token.source);
        }
    }
}
