//! Source error type shared by the tokenizer, parser, analyzer and evaluator.

use crate::span::{SourceMap, Span};
use thiserror::Error;

/// An error anchored to a source location.
///
/// Carries a message, the offending lexeme when one is known, and the
/// `[start, end)` byte span of the offender in the original source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
    pub offender: Option<String>,
    pub span: Span,
}

impl SourceError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            offender: None,
            span,
        }
    }

    pub fn with_offender(
        message: impl Into<String>,
        offender: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            message: message.into(),
            offender: Some(offender.into()),
            span,
        }
    }

    /// Render the error against its source:
    ///
    /// ```text
    /// Error: "<msg>" [caused by '<offender>'] at line: <L>, index: <S> [to <E>] in
    /// <line-source>
    /// <padding>^~~~~
    /// ```
    ///
    /// The marker padding mirrors the offending line's leading tabs with
    /// tabs so the caret lines up under tab-indented sources.
    pub fn format_with_source(&self, source: &str) -> String {
        let map = SourceMap::new(source);
        let (line, start_col) = map.line_col(self.span.start.min(source.len()));
        let (end_line, end_col) = map.line_col(self.span.end.min(source.len()));
        let line_text = map.line_text(source, line);

        let mut header = format!("Error: \"{}\"", self.message);
        if let Some(offender) = &self.offender {
            header.push_str(&format!(" caused by '{}'", offender));
        }
        header.push_str(&format!(" at line: {}, index: {}", line, start_col));
        if end_line == line && end_col > start_col + 1 {
            header.push_str(&format!(" to {}", end_col));
        }
        header.push_str(" in");

        let mut padding = String::new();
        for (i, c) in line_text.char_indices() {
            if i >= start_col {
                break;
            }
            padding.push(if c == '\t' { '\t' } else { ' ' });
        }
        let marker_len = if end_line == line {
            end_col.saturating_sub(start_col).max(1)
        } else {
            1
        };
        let mut marker = String::from("^");
        for _ in 1..marker_len {
            marker.push('~');
        }

        format!("{}\n{}\n{}{}", header, line_text, padding, marker)
    }
}

/// Result type for the compile pipeline.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_plain() {
        let source = "let a = $";
        let err = SourceError::with_offender("Unexpected character", "$", Span::new(8, 9));
        let formatted = err.format_with_source(source);
        assert_eq!(
            formatted,
            "Error: \"Unexpected character\" caused by '$' at line: 1, index: 8 in\nlet a = $\n        ^"
        );
    }

    #[test]
    fn test_format_multi_column_span() {
        let source = "a = foobar + 1";
        let err = SourceError::new("Unknown name", Span::new(4, 10));
        let formatted = err.format_with_source(source);
        assert!(formatted.contains("at line: 1, index: 4 to 10 in"));
        assert!(formatted.ends_with("    ^~~~~~"));
    }

    #[test]
    fn test_format_mirrors_tabs() {
        let source = "\t\tx = y";
        let err = SourceError::new("Unknown name", Span::new(6, 7));
        let formatted = err.format_with_source(source);
        let marker_line = formatted.lines().last().unwrap();
        assert!(marker_line.starts_with("\t\t"));
        assert!(marker_line.ends_with('^'));
    }
}
