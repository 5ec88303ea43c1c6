//! Expression parsing: a precedence cascade from conditionals down to
//! atoms, each level left-associative over the next tighter one.

use crate::ast::{Expression, ExpressionKind, LabeledExpression};
use crate::error::{SourceError, SourceResult};
use crate::span::Span;
use crate::token::{Keyword, Token, TokenKind};

use super::{unexpected, Parser};

fn binary(kind: ExpressionKind, left_span: Span, right_span: Span) -> Expression {
    Expression::new(kind, left_span.merge(&right_span))
}

impl Parser {
    pub(crate) fn parse_expression(&mut self) -> SourceResult<Expression> {
        self.parse_conditional()
    }

    pub(crate) fn parse_expression_list(&mut self) -> SourceResult<Vec<Expression>> {
        let mut expressions = vec![self.parse_expression()?];
        while self.tokens.head()?.is(",") {
            self.tokens.advance()?;
            expressions.push(self.parse_expression()?);
        }
        Ok(expressions)
    }

    /// `value if condition else other`, right-associative in the false
    /// branch.
    fn parse_conditional(&mut self) -> SourceResult<Expression> {
        let true_value = self.parse_range()?;
        if !self.tokens.head()?.is_keyword(Keyword::If) {
            return Ok(true_value);
        }
        self.tokens.advance()?;
        let condition = self.parse_range()?;
        let head = self.tokens.head()?;
        if !head.is_keyword(Keyword::Else) {
            return Err(unexpected(&head, "\"else\""));
        }
        self.tokens.advance()?;
        let false_value = self.parse_conditional()?;
        let span = true_value.span.merge(&false_value.span);
        Ok(Expression::new(
            ExpressionKind::Conditional {
                condition: Box::new(condition),
                true_value: Box::new(true_value),
                false_value: Box::new(false_value),
            },
            span,
        ))
    }

    fn parse_range(&mut self) -> SourceResult<Expression> {
        let mut from = self.parse_concatenate()?;
        while self.tokens.head()?.is("..") {
            self.tokens.advance()?;
            let to = self.parse_concatenate()?;
            let span = from.span.merge(&to.span);
            from = binary(
                ExpressionKind::Range(Box::new(from), Box::new(to)),
                span,
                span,
            );
        }
        Ok(from)
    }

    fn parse_concatenate(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_logical_or()?;
        while self.tokens.head()?.is("~") {
            self.tokens.advance()?;
            let right = self.parse_logical_or()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::Concatenate(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_logical_xor()?;
        while self.tokens.head()?.is("||") {
            self.tokens.advance()?;
            let right = self.parse_logical_xor()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::LogicalOr(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_logical_xor(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_logical_and()?;
        while self.tokens.head()?.is("^^") {
            self.tokens.advance()?;
            let right = self.parse_logical_and()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::LogicalXor(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_bitwise_or()?;
        while self.tokens.head()?.is("&&") {
            self.tokens.advance()?;
            let right = self.parse_bitwise_or()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::LogicalAnd(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_bitwise_or(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_bitwise_xor()?;
        while self.tokens.head()?.is("|") {
            self.tokens.advance()?;
            let right = self.parse_bitwise_xor()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::BitwiseOr(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_bitwise_xor(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_bitwise_and()?;
        while self.tokens.head()?.is("^") {
            self.tokens.advance()?;
            let right = self.parse_bitwise_and()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::BitwiseXor(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_bitwise_and(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_compare()?;
        while self.tokens.head()?.is("&") {
            self.tokens.advance()?;
            let right = self.parse_compare()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::BitwiseAnd(Box::new(left), Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    /// A chain `e (cmp e)+` with one optional trailing type comparison.
    fn parse_compare(&mut self) -> SourceResult<Expression> {
        let value = self.parse_shift()?;
        let head = self.tokens.head()?;
        if head.kind != TokenKind::ValueCompareOperator
            && head.kind != TokenKind::TypeCompareOperator
        {
            return Ok(value);
        }
        let mut span = value.span;
        let mut operands = vec![value];
        let mut operators = Vec::new();
        while self.tokens.head()?.kind == TokenKind::ValueCompareOperator {
            let operator = self.tokens.head()?;
            self.tokens.advance()?;
            operators.push(operator);
            let operand = self.parse_shift()?;
            span = span.merge(&operand.span);
            operands.push(operand);
        }
        let mut type_compare = None;
        if self.tokens.head()?.kind == TokenKind::TypeCompareOperator {
            let operator = self.tokens.head()?;
            self.tokens.advance()?;
            let target = self.parse_named_type()?;
            span = span.merge(&target.span);
            type_compare = Some((operator, target));
        }
        Ok(Expression::new(
            ExpressionKind::Compare {
                operands,
                operators,
                type_compare,
            },
            span,
        ))
    }

    fn parse_shift(&mut self) -> SourceResult<Expression> {
        let mut value = self.parse_add()?;
        while self.tokens.head()?.kind == TokenKind::ShiftOperator {
            let operator = self.tokens.head()?;
            self.tokens.advance()?;
            let amount = self.parse_add()?;
            let (ls, rs) = (value.span, amount.span);
            value = binary(
                ExpressionKind::Shift(Box::new(value), operator, Box::new(amount)),
                ls,
                rs,
            );
        }
        Ok(value)
    }

    fn parse_add(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_multiply()?;
        while self.tokens.head()?.kind == TokenKind::AddOperator {
            let operator = self.tokens.head()?;
            self.tokens.advance()?;
            let right = self.parse_multiply()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::Add(Box::new(left), operator, Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    fn parse_multiply(&mut self) -> SourceResult<Expression> {
        let mut left = self.parse_infix()?;
        while self.tokens.head()?.kind == TokenKind::MultiplyOperator {
            let operator = self.tokens.head()?;
            self.tokens.advance()?;
            let right = self.parse_infix()?;
            let (ls, rs) = (left.span, right.span);
            left = binary(
                ExpressionKind::Multiply(Box::new(left), operator, Box::new(right)),
                ls,
                rs,
            );
        }
        Ok(left)
    }

    /// `value name argument` — a named two-argument function used infix.
    fn parse_infix(&mut self) -> SourceResult<Expression> {
        let mut value = self.parse_exponent()?;
        while self.tokens.head()?.is_identifier() {
            let function = self.tokens.head()?;
            self.tokens.advance()?;
            let argument = self.parse_exponent()?;
            let (ls, rs) = (value.span, argument.span);
            value = binary(
                ExpressionKind::Infix(Box::new(value), function, Box::new(argument)),
                ls,
                rs,
            );
        }
        Ok(value)
    }

    fn parse_exponent(&mut self) -> SourceResult<Expression> {
        let mut value = self.parse_unary()?;
        while self.tokens.head()?.is("**") {
            self.tokens.advance()?;
            let exponent = self.parse_unary()?;
            let (ls, rs) = (value.span, exponent.span);
            value = binary(
                ExpressionKind::Exponent(Box::new(value), Box::new(exponent)),
                ls,
                rs,
            );
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> SourceResult<Expression> {
        let head = self.tokens.head()?;
        match head.source.as_str() {
            "+" | "-" => {
                self.tokens.advance()?;
                let inner = self.parse_unary()?;
                let span = head.span.merge(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::Sign(head, Box::new(inner)),
                    span,
                ))
            }
            "!" => {
                self.tokens.advance()?;
                let inner = self.parse_unary()?;
                let span = head.span.merge(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::LogicalNot(Box::new(inner)),
                    span,
                ))
            }
            "~" => {
                self.tokens.advance()?;
                let inner = self.parse_unary()?;
                let span = head.span.merge(&inner.span);
                Ok(Expression::new(
                    ExpressionKind::BitwiseNot(Box::new(inner)),
                    span,
                ))
            }
            _ => self.parse_access(),
        }
    }

    /// Postfix chain of `.name`, `[index]` and `(arguments)`; the tightest
    /// binding level.
    fn parse_access(&mut self) -> SourceResult<Expression> {
        let atom = self.parse_atom()?;
        self.parse_access_on(atom)
    }

    fn parse_access_on(&mut self, value: Expression) -> SourceResult<Expression> {
        let head = self.tokens.head()?;
        if head.is(".") {
            self.tokens.advance()?;
            let name = self.expect_identifier()?;
            let span = value.span.merge(&name.span);
            return self.parse_access_on(Expression::new(
                ExpressionKind::FieldAccess(Box::new(value), name),
                span,
            ));
        }
        if head.is("[") {
            self.tokens.advance()?;
            let index = self.parse_expression()?;
            let close = self.expect_source("]")?;
            let span = value.span.merge(&close.span);
            return self.parse_access_on(Expression::new(
                ExpressionKind::IndexAccess(Box::new(value), Box::new(index)),
                span,
            ));
        }
        if head.is("(") {
            self.tokens.advance()?;
            let arguments = if self.tokens.head()?.is(")") {
                Vec::new()
            } else {
                self.parse_expression_list()?
            };
            let close = self.expect_source(")")?;
            let span = value.span.merge(&close.span);
            return self.parse_access_on(Expression::new(
                ExpressionKind::FunctionCall(Box::new(value), arguments),
                span,
            ));
        }
        // The form `digits.identifier` lexes as float(`digits.`)identifier;
        // re-read it as an integer field access here.
        if let ExpressionKind::FloatLiteral(token) = &value.kind {
            if token.source.ends_with('.') && head.is_identifier() {
                let integer = reread_as_integer(token)?;
                let name = self.expect_identifier()?;
                let integer_span = integer.span;
                let span = integer_span.merge(&name.span);
                let object = Expression::new(
                    ExpressionKind::SignedIntegerLiteral(integer),
                    integer_span,
                );
                return self.parse_access_on(Expression::new(
                    ExpressionKind::FieldAccess(Box::new(object), name),
                    span,
                ));
            }
        }
        Ok(value)
    }

    fn parse_atom(&mut self) -> SourceResult<Expression> {
        let head = self.tokens.head()?;

        if head.is(".") {
            // Context field access
            self.tokens.advance()?;
            let name = self.expect_identifier()?;
            let span = head.span.merge(&name.span);
            return Ok(Expression::new(
                ExpressionKind::ContextFieldAccess(name),
                span,
            ));
        }

        if head.is_identifier() {
            // Name, or initializer
            self.tokens.save_position();
            if let Ok(named_type) = self.parse_named_type() {
                if self.tokens.head()?.is("{") {
                    self.tokens.discard_position();
                    let (values, close_span) = self.parse_composite_literal()?;
                    let span = named_type.span.merge(&close_span);
                    return Ok(Expression::new(
                        ExpressionKind::Initializer(named_type, values),
                        span,
                    ));
                }
            }
            self.tokens.restore_position();
            let name = self.parse_name()?;
            let span = name
                .first()
                .map(|t| t.span)
                .unwrap_or(head.span)
                .merge(&name.last().map(|t| t.span).unwrap_or(head.span));
            return Ok(Expression::new(ExpressionKind::Name(name), span));
        }

        if head.is("(") {
            self.tokens.advance()?;
            let expression = self.parse_expression()?;
            self.expect_source(")")?;
            return Ok(expression);
        }

        if head.is("{") {
            let open_span = head.span;
            let (values, close_span) = self.parse_composite_literal()?;
            return Ok(Expression::new(
                ExpressionKind::CompositeLiteral(values),
                open_span.merge(&close_span),
            ));
        }

        if head.is_keyword(Keyword::Null) {
            self.tokens.advance()?;
            return Ok(Expression::new(ExpressionKind::NullLiteral, head.span));
        }

        let kind = match head.kind {
            TokenKind::BooleanLiteral(_) => Some(ExpressionKind::BooleanLiteral(head.clone())),
            TokenKind::StringLiteral(_) => Some(ExpressionKind::StringLiteral(head.clone())),
            TokenKind::SignedIntegerLiteral(_) => {
                Some(ExpressionKind::SignedIntegerLiteral(head.clone()))
            }
            TokenKind::UnsignedIntegerLiteral(_) => {
                Some(ExpressionKind::UnsignedIntegerLiteral(head.clone()))
            }
            TokenKind::FloatLiteral(_) => Some(ExpressionKind::FloatLiteral(head.clone())),
            _ => None,
        };
        if let Some(kind) = kind {
            self.tokens.advance()?;
            return Ok(Expression::new(kind, head.span));
        }

        Err(unexpected(&head, "a literal, a name or '('"))
    }

    /// `{ part (, part)* }`; returns the parts and the closing brace span.
    pub(crate) fn parse_composite_literal(
        &mut self,
    ) -> SourceResult<(Vec<LabeledExpression>, Span)> {
        self.expect_source("{")?;
        if self.tokens.head()?.is("}") {
            let close = self.expect_source("}")?;
            return Ok((Vec::new(), close.span));
        }
        let mut values = vec![self.parse_composite_literal_part()?];
        while self.tokens.head()?.is(",") {
            self.tokens.advance()?;
            values.push(self.parse_composite_literal_part()?);
        }
        let close = self.expect_source("}")?;
        Ok((values, close.span))
    }

    fn parse_composite_literal_part(&mut self) -> SourceResult<LabeledExpression> {
        let mut label = None;
        let head = self.tokens.head()?;
        if head.is_identifier()
            || matches!(
                head.kind,
                TokenKind::SignedIntegerLiteral(_) | TokenKind::UnsignedIntegerLiteral(_)
            )
        {
            self.tokens.save_position();
            self.tokens.advance()?;
            if self.tokens.head()?.is(":") {
                self.tokens.advance()?;
                self.tokens.discard_position();
                label = Some(head);
            } else {
                self.tokens.restore_position();
            }
        }
        let value = if self.tokens.head()?.is("{") {
            let open = self.tokens.head()?;
            let (values, close_span) = self.parse_composite_literal()?;
            Expression::new(
                ExpressionKind::CompositeLiteral(values),
                open.span.merge(&close_span),
            )
        } else {
            self.parse_expression()?
        };
        Ok(LabeledExpression { label, value })
    }
}

fn reread_as_integer(float_token: &Token) -> SourceResult<Token> {
    let digits = &float_token.source[..float_token.source.len() - 1];
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let value: i64 = cleaned.parse().map_err(|_| {
        SourceError::with_offender("Invalid integer literal", digits, float_token.span)
    })?;
    Ok(Token::new(
        TokenKind::SignedIntegerLiteral(value),
        digits,
        Span::new(float_token.span.start, float_token.span.end - 1),
    ))
}
