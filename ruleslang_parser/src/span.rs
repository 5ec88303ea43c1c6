//! Span information for source locations
//!
//! Byte-offset spans into the original source, plus a line-start map used
//! when rendering diagnostics.

use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` byte range into the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset start (0-indexed)
    pub start: usize,
    /// Byte offset end (exclusive)
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// An empty span anchored at a single offset, used for synthesized
    /// tokens such as end-of-source.
    pub fn at(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Merge two spans into one that covers both.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Tracks line starts so byte offsets can be rendered as line/column pairs.
#[derive(Debug, Clone)]
pub struct SourceMap {
    /// Byte positions where each line starts
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        let bytes = source.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => line_starts.push(i + 1),
                b'\r' => {
                    // CR LF counts as one newline
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    line_starts.push(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        Self { line_starts }
    }

    /// Get 1-indexed line and 0-indexed column (byte index within the line)
    /// for a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        (line + 1, offset - line_start)
    }

    /// The full text of the 1-indexed line, without its terminator.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        let idx = line.saturating_sub(1);
        let start = self.line_starts.get(idx).copied().unwrap_or(0);
        let end = self
            .line_starts
            .get(idx + 1)
            .copied()
            .unwrap_or(source.len());
        source[start..end].trim_end_matches(['\n', '\r'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let map = SourceMap::new("let a = 1\nlet b = 2\n");
        assert_eq!(map.line_col(0), (1, 0));
        assert_eq!(map.line_col(4), (1, 4));
        assert_eq!(map.line_col(10), (2, 0));
        assert_eq!(map.line_col(14), (2, 4));
    }

    #[test]
    fn test_crlf_lines() {
        let map = SourceMap::new("a\r\nb\rc\nd");
        assert_eq!(map.line_col(3), (2, 0)); // 'b'
        assert_eq!(map.line_col(5), (3, 0)); // 'c'
        assert_eq!(map.line_col(7), (4, 0)); // 'd'
    }

    #[test]
    fn test_line_text() {
        let source = "first\nsecond\r\nthird";
        let map = SourceMap::new(source);
        assert_eq!(map.line_text(source, 1), "first");
        assert_eq!(map.line_text(source, 2), "second");
        assert_eq!(map.line_text(source, 3), "third");
    }

    #[test]
    fn test_merge() {
        let merged = Span::new(3, 7).merge(&Span::new(10, 12));
        assert_eq!(merged, Span::new(3, 12));
    }
}
