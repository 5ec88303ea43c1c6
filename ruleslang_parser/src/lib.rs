//! ruleslang_parser
//!
//! Tokenizer and indentation-sensitive parser for RulesLang, the
//! embeddable rule/expression language. Produces a syntactic tree with
//! byte-span tracking; the `ruleslang` crate lowers it to a typed
//! semantic tree.

pub mod ast;
pub mod error;
pub mod expand;
pub mod parser;
pub mod reader;
pub mod span;
pub mod token;
pub mod tokenizer;

pub use ast::{
    DeclarationKind, Expression, ExpressionKind, LabeledExpression, NamedType, Parameter,
    Statement, StatementKind, TypeExpression, TypeExpressionKind,
};
pub use error::{SourceError, SourceResult};
pub use expand::expand_operators;
pub use parser::{IndentSpec, Parser};
pub use reader::Reader;
pub use span::{SourceMap, Span};
pub use token::{Keyword, Token, TokenKind};
pub use tokenizer::Tokenizer;

/// Parse a RulesLang program into its top-level statements.
pub fn parse(source: &str) -> SourceResult<Vec<Statement>> {
    Parser::new(source).parse_program()
}

/// Parse a single expression (shell expression mode).
pub fn parse_expression(source: &str) -> SourceResult<Expression> {
    Parser::new(source).parse_single_expression()
}

/// Tokenize source into a vector of tokens, ending with `Eof`.
pub fn tokenize(source: &str) -> SourceResult<Vec<Token>> {
    let mut tokens = Tokenizer::new(source);
    let mut result = Vec::new();
    loop {
        let token = tokens.head()?;
        let eof = token.is_eof();
        result.push(token);
        if eof {
            return Ok(result);
        }
        tokens.advance()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("1 + 2").unwrap();
        assert_eq!(tokens.len(), 4);
        assert!(tokens[3].is_eof());
    }
}
