//! Operator expander
//!
//! Rewrites compound assignment `a op= b` into `a = a op b` on the
//! syntactic tree. The synthesized binary operator adopts the assignment
//! operator's start offset; no semantic analysis happens here, so running
//! the pass twice is a no-op.

use crate::ast::{Expression, ExpressionKind, Statement, StatementKind};
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// Expand compound assignments in every statement, recursing into blocks.
pub fn expand_operators(statements: &mut [Statement]) {
    for statement in statements {
        expand_statement(statement);
    }
}

fn expand_statement(statement: &mut Statement) {
    match &mut statement.kind {
        StatementKind::Assignment {
            target,
            operator,
            value,
        } => {
            if operator.is("=") {
                return;
            }
            let base = &operator.source[..operator.source.len() - 1];
            let operator_span = operator.span;
            let value_expression = std::mem::replace(
                value,
                Expression::new(ExpressionKind::NullLiteral, Span::default()),
            );
            let combined = combine(target.clone(), base, operator_span, value_expression);
            *value = combined;
            *operator = Token::new(TokenKind::AssignmentOperator, "=", operator_span);
        }
        StatementKind::ConditionalStatement {
            blocks,
            false_statements,
        } => {
            for (_, statements) in blocks {
                expand_operators(statements);
            }
            expand_operators(false_statements);
        }
        StatementKind::LoopStatement { body, .. } => expand_operators(body),
        StatementKind::FunctionDefinition { body, .. } => expand_operators(body),
        _ => {}
    }
}

fn combine(target: Expression, base: &str, operator_span: Span, value: Expression) -> Expression {
    let span = Span::new(operator_span.start, value.span.end);
    let left = Box::new(target);
    let right = Box::new(value);
    let operator_token = |kind: TokenKind| Token::new(kind, base, operator_span);
    let kind = match base {
        "**" => ExpressionKind::Exponent(left, right),
        "*" | "/" | "%" => {
            ExpressionKind::Multiply(left, operator_token(TokenKind::MultiplyOperator), right)
        }
        "+" | "-" => ExpressionKind::Add(left, operator_token(TokenKind::AddOperator), right),
        "<<" | ">>" | ">>>" => {
            ExpressionKind::Shift(left, operator_token(TokenKind::ShiftOperator), right)
        }
        "&" => ExpressionKind::BitwiseAnd(left, right),
        "^" => ExpressionKind::BitwiseXor(left, right),
        "|" => ExpressionKind::BitwiseOr(left, right),
        "&&" => ExpressionKind::LogicalAnd(left, right),
        "^^" => ExpressionKind::LogicalXor(left, right),
        "||" => ExpressionKind::LogicalOr(left, right),
        "~" => ExpressionKind::Concatenate(left, right),
        _ => unreachable!("unknown compound assignment operator '{}='", base),
    };
    Expression::new(kind, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse(source: &str) -> Vec<Statement> {
        Parser::new(source).parse_program().unwrap()
    }

    #[test]
    fn test_expands_compound_add() {
        let mut statements = parse("a += 1");
        expand_operators(&mut statements);
        assert_eq!(
            statements[0].to_string(),
            "Assignment(a = Add(a + SignedIntegerLiteral(1)))"
        );
    }

    #[test]
    fn test_expands_inside_blocks() {
        let mut statements = parse("while true:\n  a *= 2");
        expand_operators(&mut statements);
        assert_eq!(
            statements[0].to_string(),
            "LoopStatement(while BooleanLiteral(true): Assignment(a = Multiply(a * SignedIntegerLiteral(2))))"
        );
    }

    #[test]
    fn test_idempotent() {
        let mut statements = parse("a <<= 1; b ~= c");
        expand_operators(&mut statements);
        let once = statements.clone();
        expand_operators(&mut statements);
        assert_eq!(statements, once);
    }

    #[test]
    fn test_operator_adopts_assignment_offset() {
        let mut statements = parse("a **= b");
        expand_operators(&mut statements);
        let StatementKind::Assignment { value, .. } = &statements[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(value.span.start, 2);
    }
}
