//! Type syntax: named types with dimensions, and brace composite types.

use crate::ast::{NamedType, TypeExpression, TypeExpressionKind};
use crate::error::SourceResult;
use crate::token::Token;

use super::{unexpected, Parser};

impl Parser {
    /// `name (. name)* ([size] | [])*`
    pub(crate) fn parse_named_type(&mut self) -> SourceResult<NamedType> {
        let first = self.expect_identifier()?;
        let mut span = first.span;
        let mut name = vec![first];
        while self.tokens.head()?.is(".") {
            self.tokens.advance()?;
            let part = self.expect_identifier()?;
            span = span.merge(&part.span);
            name.push(part);
        }
        let mut dimensions = Vec::new();
        while self.tokens.head()?.is("[") {
            self.tokens.advance()?;
            if self.tokens.head()?.is("]") {
                let close = self.expect_source("]")?;
                span = span.merge(&close.span);
                dimensions.push(None);
            } else {
                let size = self.parse_expression()?;
                let close = self.expect_source("]")?;
                span = span.merge(&close.span);
                dimensions.push(Some(size));
            }
        }
        Ok(NamedType {
            name,
            dimensions,
            span,
        })
    }

    /// A dotted name without dimensions.
    pub(crate) fn parse_name(&mut self) -> SourceResult<Vec<Token>> {
        let first = self.expect_identifier()?;
        let mut name = vec![first];
        while self.tokens.head()?.is(".") {
            self.tokens.advance()?;
            name.push(self.expect_identifier()?);
        }
        Ok(name)
    }

    /// A named type, or a composite type: `{T1, T2}` (tuple) or
    /// `{a: T1, b: T2}` (structure). Labels follow the composite-literal
    /// save/restore protocol.
    pub(crate) fn parse_type_expression(&mut self) -> SourceResult<TypeExpression> {
        let head = self.tokens.head()?;
        if !head.is("{") {
            let named = self.parse_named_type()?;
            let span = named.span;
            return Ok(TypeExpression {
                kind: TypeExpressionKind::Named(named),
                span,
            });
        }

        let open = self.expect_source("{")?;
        let mut members = Vec::new();
        if !self.tokens.head()?.is("}") {
            loop {
                members.push(self.parse_type_member()?);
                if self.tokens.head()?.is(",") {
                    self.tokens.advance()?;
                } else {
                    break;
                }
            }
        }
        let close = self.expect_source("}")?;
        Ok(TypeExpression {
            kind: TypeExpressionKind::Composite { members },
            span: open.span.merge(&close.span),
        })
    }

    fn parse_type_member(&mut self) -> SourceResult<(Option<Token>, TypeExpression)> {
        let mut label = None;
        let head = self.tokens.head()?;
        if head.is_identifier() {
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
        let member = self.parse_type_expression()?;
        Ok((label, member))
    }

    pub(crate) fn expect_block_colon(&mut self) -> SourceResult<Token> {
        let head = self.tokens.head()?;
        if head.is(":") {
            self.tokens.advance()?;
            Ok(head)
        } else {
            Err(unexpected(&head, "':'"))
        }
    }
}
