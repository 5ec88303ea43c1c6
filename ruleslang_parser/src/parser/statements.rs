//! Statement parsing with indentation-validated blocks.

use crate::ast::{DeclarationKind, ExpressionKind, Parameter, Statement, StatementKind};
use crate::error::{SourceError, SourceResult};
use crate::token::{Keyword, Token, TokenKind};

use super::{unexpected, IndentSpec, Parser};

impl Parser {
    pub(crate) fn parse_statement(&mut self, spec: IndentSpec) -> SourceResult<Statement> {
        let head = self.tokens.head()?;
        match head.kind {
            TokenKind::Keyword(Keyword::Def) => self.parse_type_definition(),
            TokenKind::Keyword(Keyword::Let) => {
                self.parse_variable_declaration(DeclarationKind::Let)
            }
            TokenKind::Keyword(Keyword::Var) => {
                self.parse_variable_declaration(DeclarationKind::Var)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_conditional_statement(spec),
            TokenKind::Keyword(Keyword::While) => self.parse_loop(spec, None),
            TokenKind::Keyword(Keyword::Func) => self.parse_function_definition(spec),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => self.parse_jump(true),
            TokenKind::Keyword(Keyword::Continue) => self.parse_jump(false),
            TokenKind::Identifier => {
                // A loop label?
                self.tokens.save_position();
                self.tokens.advance()?;
                if self.tokens.head()?.is(":") {
                    self.tokens.advance()?;
                    if self.tokens.head()?.is_keyword(Keyword::While) {
                        self.tokens.discard_position();
                        return self.parse_loop(spec, Some(head));
                    }
                }
                self.tokens.restore_position();
                self.parse_assignment_or_call()
            }
            _ => self.parse_assignment_or_call(),
        }
    }

    fn parse_type_definition(&mut self) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let name = self.expect_identifier()?;
        let type_expression = self.parse_type_expression()?;
        let span = keyword.span.merge(&type_expression.span);
        Ok(Statement::new(
            StatementKind::TypeDefinition {
                name,
                type_expression,
            },
            span,
        ))
    }

    /// `let|var [NamedType] name [= value]`. A type is tried first; when no
    /// second identifier follows, the position is restored and the first
    /// identifier is the variable name.
    fn parse_variable_declaration(&mut self, kind: DeclarationKind) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;

        let mut declared_type = None;
        self.tokens.save_position();
        let tried = self.parse_named_type();
        let followed_by_name = tried.is_ok() && self.tokens.head()?.is_identifier();
        if followed_by_name {
            self.tokens.discard_position();
            declared_type = tried.ok();
        } else {
            self.tokens.restore_position();
        }
        let name = self.expect_identifier()?;
        let mut span = keyword.span.merge(&name.span);

        let mut value = None;
        let head = self.tokens.head()?;
        if head.kind == TokenKind::AssignmentOperator {
            if !head.is("=") {
                return Err(unexpected(&head, "'='"));
            }
            self.tokens.advance()?;
            let expression = self.parse_expression()?;
            span = span.merge(&expression.span);
            value = Some(expression);
        }
        Ok(Statement::new(
            StatementKind::VariableDeclaration {
                kind,
                declared_type,
                name,
                value,
            },
            span,
        ))
    }

    fn parse_conditional_statement(&mut self, spec: IndentSpec) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let condition = self.parse_expression()?;
        let body = self.parse_block(spec)?;
        let mut span = keyword.span;
        if let Some(last) = body.last() {
            span = span.merge(&last.span);
        }
        let mut blocks = vec![(condition, body)];
        let mut false_statements = Vec::new();

        loop {
            if !self.try_consume_else(spec)? {
                break;
            }
            if self.tokens.head()?.is_keyword(Keyword::If) {
                self.tokens.advance()?;
                let condition = self.parse_expression()?;
                let body = self.parse_block(spec)?;
                if let Some(last) = body.last() {
                    span = span.merge(&last.span);
                }
                blocks.push((condition, body));
            } else {
                false_statements = self.parse_block(spec)?;
                if let Some(last) = false_statements.last() {
                    span = span.merge(&last.span);
                }
                break;
            }
        }

        Ok(Statement::new(
            StatementKind::ConditionalStatement {
                blocks,
                false_statements,
            },
            span,
        ))
    }

    /// Look ahead for an `else` at this block's own indentation level,
    /// using the tokenizer's save/restore protocol.
    fn try_consume_else(&mut self, spec: IndentSpec) -> SourceResult<bool> {
        self.tokens.save_position();
        let mut last_indent: Option<Token> = None;
        loop {
            let head = self.tokens.head()?;
            match head.kind {
                TokenKind::Indentation => {
                    last_indent = Some(head);
                    self.tokens.advance()?;
                }
                TokenKind::Terminator => {
                    last_indent = None;
                    self.tokens.advance()?;
                }
                _ => break,
            }
        }
        let head = self.tokens.head()?;
        if head.is_keyword(Keyword::Else) && spec.validates(last_indent.as_ref())? {
            self.tokens.advance()?;
            self.tokens.discard_position();
            Ok(true)
        } else {
            self.tokens.restore_position();
            Ok(false)
        }
    }

    fn parse_loop(&mut self, spec: IndentSpec, label: Option<Token>) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let condition = self.parse_expression()?;
        let body = self.parse_block(spec)?;
        let mut span = label
            .as_ref()
            .map(|l| l.span)
            .unwrap_or(keyword.span)
            .merge(&condition.span);
        if let Some(last) = body.last() {
            span = span.merge(&last.span);
        }
        Ok(Statement::new(
            StatementKind::LoopStatement {
                label,
                condition,
                body,
            },
            span,
        ))
    }

    fn parse_function_definition(&mut self, spec: IndentSpec) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let name = self.expect_identifier()?;
        self.expect_source("(")?;
        let mut parameters = Vec::new();
        if !self.tokens.head()?.is(")") {
            loop {
                let parameter_type = self.parse_named_type()?;
                let parameter_name = self.expect_identifier()?;
                parameters.push(Parameter {
                    parameter_type,
                    name: parameter_name,
                });
                if self.tokens.head()?.is(",") {
                    self.tokens.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect_source(")")?;
        let return_type = if self.tokens.head()?.is(":") {
            None
        } else {
            Some(self.parse_named_type()?)
        };
        let body = self.parse_block(spec)?;
        let mut span = keyword.span.merge(&name.span);
        if let Some(last) = body.last() {
            span = span.merge(&last.span);
        }
        Ok(Statement::new(
            StatementKind::FunctionDefinition {
                name,
                parameters,
                return_type,
                body,
            },
            span,
        ))
    }

    fn parse_return(&mut self) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let head = self.tokens.head()?;
        let value = if head.kind == TokenKind::Terminator || head.is_eof() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let span = value
            .as_ref()
            .map(|v| keyword.span.merge(&v.span))
            .unwrap_or(keyword.span);
        Ok(Statement::new(StatementKind::ReturnStatement(value), span))
    }

    fn parse_jump(&mut self, is_break: bool) -> SourceResult<Statement> {
        let keyword = self.tokens.head()?;
        self.tokens.advance()?;
        let head = self.tokens.head()?;
        let label = if head.is_identifier() {
            self.tokens.advance()?;
            Some(head)
        } else {
            None
        };
        let span = label
            .as_ref()
            .map(|l| keyword.span.merge(&l.span))
            .unwrap_or(keyword.span);
        let kind = if is_break {
            StatementKind::BreakStatement(label)
        } else {
            StatementKind::ContinueStatement(label)
        };
        Ok(Statement::new(kind, span))
    }

    fn parse_assignment_or_call(&mut self) -> SourceResult<Statement> {
        let target = self.parse_expression()?;
        let head = self.tokens.head()?;
        if head.kind == TokenKind::AssignmentOperator {
            self.tokens.advance()?;
            let value = self.parse_expression()?;
            let span = target.span.merge(&value.span);
            return Ok(Statement::new(
                StatementKind::Assignment {
                    target,
                    operator: head,
                    value,
                },
                span,
            ));
        }
        if matches!(target.kind, ExpressionKind::FunctionCall(..)) {
            let span = target.span;
            return Ok(Statement::new(
                StatementKind::FunctionCallStatement(target),
                span,
            ));
        }
        Err(SourceError::new(
            "Expected an assignment or a call",
            target.span,
        ))
    }

    /// `: <newline> <indented statements>` — consumes the colon, validates
    /// a terminator follows, derives the block's indentation from the
    /// first non-empty line, and parses the block.
    fn parse_block(&mut self, outer: IndentSpec) -> SourceResult<Vec<Statement>> {
        self.expect_block_colon()?;
        let head = self.tokens.head()?;
        if head.kind != TokenKind::Terminator {
            return Err(unexpected(&head, "a new line"));
        }
        let spec = self.derive_block_spec(outer)?;
        self.parse_statements(spec)
    }

    /// Compute the block's `IndentSpec` from the first non-empty
    /// indentation following the header. The whitespace character must
    /// match the enclosing indent's when that is nonempty; the count must
    /// be strictly greater.
    fn derive_block_spec(&mut self, outer: IndentSpec) -> SourceResult<IndentSpec> {
        self.tokens.save_position();
        let result = self.derive_block_spec_inner(outer);
        self.tokens.restore_position();
        result
    }

    fn derive_block_spec_inner(&mut self, outer: IndentSpec) -> SourceResult<IndentSpec> {
        loop {
            let head = self.tokens.head()?;
            match head.kind {
                TokenKind::Terminator => {
                    self.tokens.advance()?;
                }
                TokenKind::Indentation => {
                    self.tokens.advance()?;
                    if self.tokens.head()?.kind == TokenKind::Terminator {
                        // Blank line; keep scanning.
                        continue;
                    }
                    return new_block_spec(&head, outer);
                }
                TokenKind::Eof => {
                    return Err(SourceError::new("Expected an indented block", head.span));
                }
                _ => {
                    return Err(SourceError::with_offender(
                        "Not enough indentation",
                        &head.source,
                        head.span,
                    ));
                }
            }
        }
    }
}

fn new_block_spec(indentation: &Token, outer: IndentSpec) -> SourceResult<IndentSpec> {
    let mut chars = indentation.source.chars();
    let first = chars.next().unwrap_or(' ');
    if chars.any(|c| c != first) {
        return Err(SourceError::with_offender(
            "Mixed indentation",
            &indentation.source,
            indentation.span,
        ));
    }
    if !outer.is_top_level() && first != outer.character {
        return Err(SourceError::with_offender(
            "Mixed indentation",
            &indentation.source,
            indentation.span,
        ));
    }
    let count = indentation.source.chars().count();
    if count <= outer.count {
        return Err(SourceError::with_offender(
            "Not enough indentation",
            &indentation.source,
            indentation.span,
        ));
    }
    Ok(IndentSpec {
        character: first,
        count,
    })
}
