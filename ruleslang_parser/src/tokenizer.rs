//! Tokenizer
//!
//! Produces a lazy sequence of tokens from the reader's code points.
//! Tokens are buffered as they are lexed so the parser can save, discard
//! and restore cursor positions for bounded backtracking.

use crate::error::{SourceError, SourceResult};
use crate::reader::Reader;
use crate::span::Span;
use crate::token::{Keyword, Token, TokenKind, SYMBOLS};

pub struct Tokenizer {
    reader: Reader,
    tokens: Vec<Token>,
    index: usize,
    saved: Vec<usize>,
    at_line_start: bool,
}

impl Tokenizer {
    pub fn new(source: &str) -> Self {
        Self {
            reader: Reader::new(source),
            tokens: Vec::new(),
            index: 0,
            saved: Vec::new(),
            at_line_start: true,
        }
    }

    /// The NFC-normalized source text all spans refer to.
    pub fn source(&self) -> &str {
        self.reader.source()
    }

    /// Peek at the current token without consuming it.
    pub fn head(&mut self) -> SourceResult<Token> {
        self.ensure()?;
        Ok(self.tokens[self.index.min(self.tokens.len() - 1)].clone())
    }

    /// Consume the current token. End-of-source is sticky.
    pub fn advance(&mut self) -> SourceResult<()> {
        self.ensure()?;
        if !self.tokens[self.index].is_eof() {
            self.index += 1;
        }
        Ok(())
    }

    /// Push a snapshot of the cursor position.
    pub fn save_position(&mut self) {
        self.saved.push(self.index);
    }

    /// Pop the most recent snapshot without rewinding.
    pub fn discard_position(&mut self) {
        self.saved.pop();
    }

    /// Pop the most recent snapshot and rewind to it.
    pub fn restore_position(&mut self) {
        if let Some(index) = self.saved.pop() {
            self.index = index;
        }
    }

    fn ensure(&mut self) -> SourceResult<()> {
        while self.index >= self.tokens.len() {
            if matches!(self.tokens.last(), Some(t) if t.is_eof()) {
                self.index = self.tokens.len() - 1;
                break;
            }
            let token = self.lex_next()?;
            self.tokens.push(token);
        }
        Ok(())
    }

    fn lex_next(&mut self) -> SourceResult<Token> {
        if self.at_line_start {
            self.at_line_start = false;
            if self.reader.has() && is_indent_char(self.reader.head()) {
                let start = self.reader.count();
                while self.reader.has() && is_indent_char(self.reader.head()) {
                    self.reader.collect();
                }
                let source = self.reader.pop();
                let end = self.reader.count();
                return Ok(Token::new(
                    TokenKind::Indentation,
                    source,
                    Span::new(start, end),
                ));
            }
        }

        while self.reader.has() && is_indent_char(self.reader.head()) {
            self.reader.advance();
        }

        let start = self.reader.count();
        if !self.reader.has() {
            return Ok(Token::new(TokenKind::Eof, "", Span::at(start)));
        }

        let head = self.reader.head();
        match head {
            '\n' | '\r' => {
                self.reader.collect();
                if head == '\r' && self.reader.head() == '\n' {
                    self.reader.collect();
                }
                self.at_line_start = true;
                let source = self.reader.pop();
                let end = self.reader.count();
                Ok(Token::new(
                    TokenKind::Terminator,
                    source,
                    Span::new(start, end),
                ))
            }
            ';' => {
                self.reader.collect();
                let source = self.reader.pop();
                Ok(Token::new(
                    TokenKind::Terminator,
                    source,
                    Span::new(start, self.reader.count()),
                ))
            }
            c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            '.' if self.reader.peek().is_ascii_digit() => self.lex_float_fraction(start),
            '"' => self.lex_string(start),
            _ => self.lex_symbol(start),
        }
    }

    fn lex_word(&mut self, start: usize) -> SourceResult<Token> {
        while self.reader.has() {
            let c = self.reader.head();
            if c.is_ascii_alphanumeric() || c == '_' {
                self.reader.collect();
            } else {
                break;
            }
        }
        let source = self.reader.pop();
        let span = Span::new(start, self.reader.count());
        let kind = match source.as_str() {
            "true" => TokenKind::BooleanLiteral(true),
            "false" => TokenKind::BooleanLiteral(false),
            word => match Keyword::from_str(word) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier,
            },
        };
        Ok(Token::new(kind, source, span))
    }

    fn lex_number(&mut self, start: usize) -> SourceResult<Token> {
        let first = self.reader.head();
        let second = self.reader.peek();
        if first == '0' && (second == 'x' || second == 'X') {
            return self.lex_radix_integer(start, 16);
        }
        if first == '0' && (second == 'b' || second == 'B') {
            return self.lex_radix_integer(start, 2);
        }

        while self.reader.head().is_ascii_digit() || self.reader.head() == '_' {
            self.reader.collect();
        }

        // A '.' continues into a float unless it begins a range operator.
        if self.reader.head() == '.' && self.reader.peek() != '.' {
            self.reader.collect();
            while self.reader.head().is_ascii_digit() || self.reader.head() == '_' {
                self.reader.collect();
            }
            self.lex_float_exponent();
            return self.finish_float(start);
        }

        let source = self.reader.pop();
        let span = Span::new(start, self.reader.count());
        let digits: String = source.chars().filter(|c| *c != '_').collect();
        let value: u128 = digits
            .parse()
            .map_err(|_| SourceError::with_offender("Invalid integer literal", &source, span))?;
        integer_token(value, source, span, true)
    }

    fn lex_radix_integer(&mut self, start: usize, radix: u32) -> SourceResult<Token> {
        self.reader.collect();
        self.reader.collect();
        let mut any = false;
        while self.reader.head().is_ascii_hexdigit() || self.reader.head() == '_' {
            if self.reader.head() != '_' {
                any = true;
            }
            self.reader.collect();
        }
        let source = self.reader.pop();
        let span = Span::new(start, self.reader.count());
        if !any {
            return Err(SourceError::with_offender(
                "Invalid integer literal",
                &source,
                span,
            ));
        }
        let digits: String = source[2..].chars().filter(|c| *c != '_').collect();
        let value = u128::from_str_radix(&digits, radix)
            .map_err(|_| SourceError::with_offender("Invalid integer literal", &source, span))?;
        integer_token(value, source, span, false)
    }

    fn lex_float_fraction(&mut self, start: usize) -> SourceResult<Token> {
        self.reader.collect();
        while self.reader.head().is_ascii_digit() || self.reader.head() == '_' {
            self.reader.collect();
        }
        self.lex_float_exponent();
        self.finish_float(start)
    }

    fn lex_float_exponent(&mut self) {
        let head = self.reader.head();
        if head != 'e' && head != 'E' {
            return;
        }
        let after = self.reader.peek();
        if after.is_ascii_digit() {
            self.reader.collect();
        } else if (after == '+' || after == '-') && self.reader.peek_at(2).is_ascii_digit() {
            self.reader.collect();
            self.reader.collect();
        } else {
            return;
        }
        while self.reader.head().is_ascii_digit() || self.reader.head() == '_' {
            self.reader.collect();
        }
    }

    fn finish_float(&mut self, start: usize) -> SourceResult<Token> {
        let source = self.reader.pop();
        let span = Span::new(start, self.reader.count());
        let mut cleaned: String = source.chars().filter(|c| *c != '_').collect();
        if cleaned.ends_with('.') {
            cleaned.push('0');
        }
        if let Some(position) = cleaned.find(".e").or_else(|| cleaned.find(".E")) {
            cleaned.insert(position + 1, '0');
        }
        let value: f64 = cleaned
            .parse()
            .map_err(|_| SourceError::with_offender("Invalid float literal", &source, span))?;
        if value.is_infinite() {
            return Err(SourceError::with_offender(
                "Float literal out of range",
                &source,
                span,
            ));
        }
        Ok(Token::new(TokenKind::FloatLiteral(value), source, span))
    }

    fn lex_string(&mut self, start: usize) -> SourceResult<Token> {
        self.reader.collect();
        let mut value = Vec::new();
        loop {
            if !self.reader.has() {
                return Err(SourceError::new(
                    "Unterminated string literal",
                    Span::new(start, self.reader.count()),
                ));
            }
            match self.reader.head() {
                '"' => {
                    self.reader.collect();
                    break;
                }
                '\n' | '\r' => {
                    return Err(SourceError::new(
                        "Unterminated string literal",
                        Span::new(start, self.reader.count()),
                    ));
                }
                '\\' => {
                    let escape_start = self.reader.count();
                    self.reader.collect();
                    let escape = self.reader.head();
                    self.reader.collect();
                    let decoded = match escape {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let digit = self.reader.head();
                                let value = digit.to_digit(16).ok_or_else(|| {
                                    SourceError::new(
                                        "Invalid escape sequence",
                                        Span::new(escape_start, self.reader.count()),
                                    )
                                })?;
                                code = code * 16 + value;
                                self.reader.collect();
                            }
                            char::from_u32(code).ok_or_else(|| {
                                SourceError::new(
                                    "Invalid escape sequence",
                                    Span::new(escape_start, self.reader.count()),
                                )
                            })?
                        }
                        _ => {
                            return Err(SourceError::new(
                                "Invalid escape sequence",
                                Span::new(escape_start, self.reader.count()),
                            ));
                        }
                    };
                    value.push(decoded);
                }
                c => {
                    value.push(c);
                    self.reader.collect();
                }
            }
        }
        let source = self.reader.pop();
        Ok(Token::new(
            TokenKind::StringLiteral(value),
            source,
            Span::new(start, self.reader.count()),
        ))
    }

    fn lex_symbol(&mut self, start: usize) -> SourceResult<Token> {
        for (lexeme, kind) in SYMBOLS {
            if self.reader.starts_with(lexeme) {
                for _ in 0..lexeme.chars().count() {
                    self.reader.collect();
                }
                let source = self.reader.pop();
                return Ok(Token::new(
                    kind.clone(),
                    source,
                    Span::new(start, self.reader.count()),
                ));
            }
        }
        let offender = self.reader.head().to_string();
        Err(SourceError::with_offender(
            "Unexpected character",
            offender,
            Span::new(start, start + self.reader.head().len_utf8()),
        ))
    }
}

fn is_indent_char(c: char) -> bool {
    c.is_whitespace() && c != '\n' && c != '\r'
}

fn integer_token(
    value: u128,
    source: String,
    span: Span,
    decimal: bool,
) -> SourceResult<Token> {
    if decimal {
        if let Ok(signed) = i64::try_from(value) {
            return Ok(Token::new(
                TokenKind::SignedIntegerLiteral(signed),
                source,
                span,
            ));
        }
    }
    match u64::try_from(value) {
        Ok(unsigned) => Ok(Token::new(
            TokenKind::UnsignedIntegerLiteral(unsigned),
            source,
            span,
        )),
        Err(_) => Err(SourceError::with_offender(
            "Integer literal too large",
            &source,
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut tokens = Tokenizer::new(source);
        let mut result = Vec::new();
        loop {
            let token = tokens.head().unwrap();
            let eof = token.is_eof();
            result.push(token.kind);
            if eof {
                break;
            }
            tokens.advance().unwrap();
        }
        result
    }

    #[test]
    fn test_spans_recover_source() {
        let source = "let a = 1 + 2";
        let mut tokens = Tokenizer::new(source);
        loop {
            let token = tokens.head().unwrap();
            if token.is_eof() {
                assert_eq!(token.span.start, token.span.end);
                break;
            }
            assert_eq!(&source[token.span.start..token.span.end], token.source);
            tokens.advance().unwrap();
        }
    }

    #[test]
    fn test_indentation_and_terminator() {
        assert_eq!(
            kinds("if a:\n  b = 1\n"),
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Identifier,
                TokenKind::OtherSymbol,
                TokenKind::Terminator,
                TokenKind::Indentation,
                TokenKind::Identifier,
                TokenKind::AssignmentOperator,
                TokenKind::SignedIntegerLiteral(1),
                TokenKind::Terminator,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_semicolon_terminator() {
        let result = kinds("a; b");
        assert_eq!(
            result,
            vec![
                TokenKind::Identifier,
                TokenKind::Terminator,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_classing() {
        assert_eq!(kinds("42")[0], TokenKind::SignedIntegerLiteral(42));
        assert_eq!(kinds("0xff")[0], TokenKind::UnsignedIntegerLiteral(255));
        assert_eq!(kinds("0b1010")[0], TokenKind::UnsignedIntegerLiteral(10));
        assert_eq!(
            kinds("1_000_000")[0],
            TokenKind::SignedIntegerLiteral(1_000_000)
        );
        assert_eq!(
            kinds("9223372036854775808")[0],
            TokenKind::UnsignedIntegerLiteral(9223372036854775808)
        );
    }

    #[test]
    fn test_integer_overflow() {
        let mut tokens = Tokenizer::new("18446744073709551616");
        let err = tokens.head().unwrap_err();
        assert_eq!(err.message, "Integer literal too large");
    }

    #[test]
    fn test_float_literals() {
        assert_eq!(kinds("3.25")[0], TokenKind::FloatLiteral(3.25));
        assert_eq!(kinds(".5")[0], TokenKind::FloatLiteral(0.5));
        assert_eq!(kinds("1.5e2")[0], TokenKind::FloatLiteral(150.0));
        assert_eq!(kinds("2.e-1")[0], TokenKind::FloatLiteral(0.2));
    }

    #[test]
    fn test_float_overflow() {
        let mut tokens = Tokenizer::new("1.0e999");
        let err = tokens.head().unwrap_err();
        assert_eq!(err.message, "Float literal out of range");
    }

    #[test]
    fn test_trailing_dot_is_float() {
        // "123." lexes as a float; the parser re-reads it as integer field
        // access when an identifier follows.
        assert_eq!(kinds("123.")[0], TokenKind::FloatLiteral(123.0));
    }

    #[test]
    fn test_range_is_not_float() {
        assert_eq!(
            kinds("1..4"),
            vec![
                TokenKind::SignedIntegerLiteral(1),
                TokenKind::OtherSymbol,
                TokenKind::SignedIntegerLiteral(4),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let result = kinds(r#""a\u0041\n\t\"""#);
        assert_eq!(
            result[0],
            TokenKind::StringLiteral(vec!['a', 'A', '\n', '\t', '"'])
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut tokens = Tokenizer::new("\"abc");
        let err = tokens.head().unwrap_err();
        assert_eq!(err.message, "Unterminated string literal");
    }

    #[test]
    fn test_maximal_munch() {
        let mut tokens = Tokenizer::new(">>>= >>> >> > <<: <: <:>");
        let mut sources = Vec::new();
        loop {
            let token = tokens.head().unwrap();
            if token.is_eof() {
                break;
            }
            sources.push(token.source.clone());
            tokens.advance().unwrap();
        }
        assert_eq!(sources, vec![">>>=", ">>>", ">>", ">", "<<:", "<:", "<:>"]);
    }

    #[test]
    fn test_save_restore() {
        let mut tokens = Tokenizer::new("a b c");
        tokens.save_position();
        tokens.advance().unwrap();
        tokens.advance().unwrap();
        assert_eq!(tokens.head().unwrap().source, "c");
        tokens.restore_position();
        assert_eq!(tokens.head().unwrap().source, "a");
        tokens.save_position();
        tokens.advance().unwrap();
        tokens.discard_position();
        assert_eq!(tokens.head().unwrap().source, "b");
    }

    #[test]
    fn test_crlf_terminator() {
        let result = kinds("a\r\nb");
        assert_eq!(
            result,
            vec![
                TokenKind::Identifier,
                TokenKind::Terminator,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }
}
