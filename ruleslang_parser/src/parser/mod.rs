//! Recursive descent parser for RulesLang.
//!
//! Expressions are parsed by a precedence cascade (`expressions`);
//! statements by an indentation-validated block parser (`statements`).
//! Backtracking is bounded: the tokenizer's save/discard/restore cursor
//! stack covers the `let`/`var` type ambiguity, `else` lookahead, loop
//! labels, and composite-literal labels.

mod expressions;
mod statements;
mod types;

use crate::ast::{Expression, Statement};
use crate::error::{SourceError, SourceResult};
use crate::token::{Token, TokenKind};
use crate::tokenizer::Tokenizer;

/// The whitespace shape each statement at a given block depth must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentSpec {
    pub character: char,
    pub count: usize,
}

impl IndentSpec {
    /// The top level: no indentation.
    pub fn none() -> Self {
        Self {
            character: ' ',
            count: 0,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.count == 0
    }

    /// Whether an indentation token (or its absence) matches this spec.
    /// Mixed whitespace within the token is an error.
    pub fn validates(&self, indentation: Option<&Token>) -> SourceResult<bool> {
        let Some(token) = indentation else {
            return Ok(self.count == 0);
        };
        let mut chars = token.source.chars();
        let first = chars.next().unwrap_or(' ');
        if chars.any(|c| c != first) {
            return Err(SourceError::with_offender(
                "Mixed indentation",
                &token.source,
                token.span,
            ));
        }
        Ok(first == self.character && token.source.chars().count() == self.count)
    }
}

pub struct Parser {
    pub(crate) tokens: Tokenizer,
    /// Set after a `;` terminator so a further statement on the same line
    /// (or, as inherited behavior, the next line) skips indent validation.
    next_indent_ignored: bool,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Self {
            tokens: Tokenizer::new(source),
            next_indent_ignored: false,
        }
    }

    /// The NFC-normalized source all spans refer to.
    pub fn source(&self) -> &str {
        self.tokens.source()
    }

    /// Parse a whole program: top-level statements to end of source.
    pub fn parse_program(&mut self) -> SourceResult<Vec<Statement>> {
        let statements = self.parse_statements(IndentSpec::none())?;
        let head = self.tokens.head()?;
        if !head.is_eof() {
            return Err(unexpected(&head, "a statement"));
        }
        Ok(statements)
    }

    /// Parse a single expression, requiring the whole input be consumed
    /// apart from trailing terminators. Used by the shell's expression mode.
    pub fn parse_single_expression(&mut self) -> SourceResult<Expression> {
        self.skip_layout()?;
        let expression = self.parse_expression()?;
        self.skip_layout()?;
        let head = self.tokens.head()?;
        if !head.is_eof() {
            return Err(unexpected(&head, "end of expression"));
        }
        Ok(expression)
    }

    fn skip_layout(&mut self) -> SourceResult<()> {
        loop {
            let head = self.tokens.head()?;
            match head.kind {
                TokenKind::Indentation | TokenKind::Terminator => self.tokens.advance()?,
                _ => return Ok(()),
            }
        }
    }

    /// Parse the statements of one block.
    ///
    /// Repeatedly consumes layout tokens, remembering only the last
    /// indentation before a non-layout token, then validates it against
    /// `spec`. A non-matching indent ends a non-empty nested block (the
    /// layout tokens are handed back for the outer block); at the top
    /// level, or while the block is still empty, it is a parse error.
    pub(crate) fn parse_statements(&mut self, spec: IndentSpec) -> SourceResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
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
            if head.is_eof() {
                self.tokens.discard_position();
                if statements.is_empty() && !spec.is_top_level() {
                    return Err(SourceError::new("Expected an indented block", head.span));
                }
                break;
            }

            let valid = self.next_indent_ignored || spec.validates(last_indent.as_ref())?;
            if !valid {
                if !statements.is_empty() && !spec.is_top_level() {
                    self.tokens.restore_position();
                    break;
                }
                let (offender, span) = match &last_indent {
                    Some(token) => (token.source.clone(), token.span),
                    None => (head.source.clone(), head.span),
                };
                return Err(SourceError::with_offender(
                    format!("Expected {} of '{}'", spec.count, spec.character),
                    offender,
                    span,
                ));
            }
            self.tokens.discard_position();
            self.next_indent_ignored = false;

            statements.push(self.parse_statement(spec)?);

            let head = self.tokens.head()?;
            match head.kind {
                TokenKind::Terminator if head.is(";") => {
                    self.next_indent_ignored = true;
                    self.tokens.advance()?;
                }
                // Newline terminators are layout for the next iteration.
                TokenKind::Terminator | TokenKind::Eof => {}
                _ => return Err(unexpected(&head, "end of statement")),
            }
        }
        Ok(statements)
    }

    // ==================== Token helpers ====================

    pub(crate) fn expect_source(&mut self, source: &str) -> SourceResult<Token> {
        let head = self.tokens.head()?;
        if head.is(source) {
            self.tokens.advance()?;
            Ok(head)
        } else {
            Err(unexpected(&head, &format!("'{}'", source)))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> SourceResult<Token> {
        let head = self.tokens.head()?;
        if head.is_identifier() {
            self.tokens.advance()?;
            Ok(head)
        } else {
            Err(unexpected(&head, "an identifier"))
        }
    }
}

pub(crate) fn unexpected(token: &Token, expected: &str) -> SourceError {
    if token.is_eof() {
        SourceError::new(format!("Expected {}, found end of source", expected), token.span)
    } else {
        SourceError::with_offender(
            format!("Expected {}", expected),
            &token.source,
            token.span,
        )
    }
}
