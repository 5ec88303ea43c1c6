//! Token definitions for the RulesLang tokenizer.

use std::fmt;

use crate::span::Span;

/// Reserved words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Let,
    Var,
    If,
    Else,
    While,
    Func,
    Return,
    Break,
    Continue,
    Null,
}

impl Keyword {
    pub fn from_str(word: &str) -> Option<Keyword> {
        Some(match word {
            "def" => Keyword::Def,
            "let" => Keyword::Let,
            "var" => Keyword::Var,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "func" => Keyword::Func,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "null" => Keyword::Null,
            _ => return None,
        })
    }
}

/// Token kinds.
///
/// Operators carry one variant per precedence class; symbols outside those
/// classes (brackets, punctuation, the concatenate/range/logic lexemes) are
/// `OtherSymbol` and are matched by source text in the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Indentation,
    Terminator,
    Identifier,
    Keyword(Keyword),
    MultiplyOperator,
    AddOperator,
    ShiftOperator,
    ValueCompareOperator,
    TypeCompareOperator,
    AssignmentOperator,
    OtherSymbol,
    BooleanLiteral(bool),
    StringLiteral(Vec<char>),
    SignedIntegerLiteral(i64),
    UnsignedIntegerLiteral(u64),
    FloatLiteral(f64),
    Eof,
}

/// A token with its source lexeme and `[start, end)` byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub source: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, source: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            source: source.into(),
            span,
        }
    }

    /// Check the token's source text, matching any symbol or keyword.
    pub fn is(&self, source: &str) -> bool {
        self.source == source
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::BooleanLiteral(_)
                | TokenKind::StringLiteral(_)
                | TokenKind::SignedIntegerLiteral(_)
                | TokenKind::UnsignedIntegerLiteral(_)
                | TokenKind::FloatLiteral(_)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::BooleanLiteral(_) => write!(f, "BooleanLiteral({})", self.source),
            TokenKind::StringLiteral(_) => write!(f, "StringLiteral({})", self.source),
            TokenKind::SignedIntegerLiteral(_) => {
                write!(f, "SignedIntegerLiteral({})", self.source)
            }
            TokenKind::UnsignedIntegerLiteral(_) => {
                write!(f, "UnsignedIntegerLiteral({})", self.source)
            }
            TokenKind::FloatLiteral(_) => write!(f, "FloatLiteral({})", self.source),
            TokenKind::Eof => write!(f, "end of source"),
            _ => write!(f, "{}", self.source),
        }
    }
}

/// Operator and punctuation lexemes with their token classes, ordered
/// longest-first so the tokenizer can munch maximally by scanning in order.
pub const SYMBOLS: &[(&str, TokenKind)] = &[
    (">>>=", TokenKind::AssignmentOperator),
    (">>>", TokenKind::ShiftOperator),
    ("===", TokenKind::ValueCompareOperator),
    ("!==", TokenKind::ValueCompareOperator),
    ("<<:", TokenKind::TypeCompareOperator),
    (">>:", TokenKind::TypeCompareOperator),
    ("<:>", TokenKind::TypeCompareOperator),
    ("**=", TokenKind::AssignmentOperator),
    ("<<=", TokenKind::AssignmentOperator),
    (">>=", TokenKind::AssignmentOperator),
    ("&&=", TokenKind::AssignmentOperator),
    ("^^=", TokenKind::AssignmentOperator),
    ("||=", TokenKind::AssignmentOperator),
    ("**", TokenKind::OtherSymbol),
    ("<<", TokenKind::ShiftOperator),
    (">>", TokenKind::ShiftOperator),
    ("==", TokenKind::ValueCompareOperator),
    ("!=", TokenKind::ValueCompareOperator),
    ("<=", TokenKind::ValueCompareOperator),
    (">=", TokenKind::ValueCompareOperator),
    ("::", TokenKind::TypeCompareOperator),
    ("!:", TokenKind::TypeCompareOperator),
    ("<:", TokenKind::TypeCompareOperator),
    (">:", TokenKind::TypeCompareOperator),
    ("&&", TokenKind::OtherSymbol),
    ("^^", TokenKind::OtherSymbol),
    ("||", TokenKind::OtherSymbol),
    ("..", TokenKind::OtherSymbol),
    ("*=", TokenKind::AssignmentOperator),
    ("/=", TokenKind::AssignmentOperator),
    ("%=", TokenKind::AssignmentOperator),
    ("+=", TokenKind::AssignmentOperator),
    ("-=", TokenKind::AssignmentOperator),
    ("&=", TokenKind::AssignmentOperator),
    ("^=", TokenKind::AssignmentOperator),
    ("|=", TokenKind::AssignmentOperator),
    ("~=", TokenKind::AssignmentOperator),
    ("*", TokenKind::MultiplyOperator),
    ("/", TokenKind::MultiplyOperator),
    ("%", TokenKind::MultiplyOperator),
    ("+", TokenKind::AddOperator),
    ("-", TokenKind::AddOperator),
    ("<", TokenKind::ValueCompareOperator),
    (">", TokenKind::ValueCompareOperator),
    ("&", TokenKind::OtherSymbol),
    ("^", TokenKind::OtherSymbol),
    ("|", TokenKind::OtherSymbol),
    ("~", TokenKind::OtherSymbol),
    ("=", TokenKind::AssignmentOperator),
    ("!", TokenKind::OtherSymbol),
    ("(", TokenKind::OtherSymbol),
    (")", TokenKind::OtherSymbol),
    ("[", TokenKind::OtherSymbol),
    ("]", TokenKind::OtherSymbol),
    ("{", TokenKind::OtherSymbol),
    ("}", TokenKind::OtherSymbol),
    (",", TokenKind::OtherSymbol),
    (":", TokenKind::OtherSymbol),
    (".", TokenKind::OtherSymbol),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Keyword::from_str("while"), Some(Keyword::While));
        assert_eq!(Keyword::from_str("otherwise"), None);
    }

    #[test]
    fn test_symbols_ordered_longest_first() {
        for window in SYMBOLS.windows(2) {
            assert!(window[0].0.len() >= window[1].0.len());
        }
    }

    #[test]
    fn test_display() {
        let token = Token::new(
            TokenKind::SignedIntegerLiteral(7),
            "7",
            Span::new(0, 1),
        );
        assert_eq!(token.to_string(), "SignedIntegerLiteral(7)");
    }
}
