//! Source reader
//!
//! Normalizes input text to NFC and exposes it as a sequence of code
//! points with byte-offset tracking for diagnostics. Spans produced by the
//! tokenizer refer to the normalized text, which callers keep around for
//! error rendering.

use unicode_normalization::UnicodeNormalization;

/// Sentinel code point returned by [`Reader::head`] past end of source.
pub const END_OF_TEXT: char = '\u{0004}';

/// A cursor over NFC-normalized source code points.
pub struct Reader {
    source: String,
    chars: Vec<char>,
    /// Byte offset of each code point in `source`, plus a final entry for
    /// the end of the source.
    offsets: Vec<usize>,
    position: usize,
    buffer: String,
}

impl Reader {
    pub fn new(raw: &str) -> Self {
        let source: String = raw.nfc().collect();
        let chars: Vec<char> = source.chars().collect();
        let mut offsets = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for c in &chars {
            offsets.push(offset);
            offset += c.len_utf8();
        }
        offsets.push(offset);
        Self {
            source,
            chars,
            offsets,
            position: 0,
            buffer: String::new(),
        }
    }

    /// The normalized source text that spans refer to.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has(&self) -> bool {
        self.position < self.chars.len()
    }

    /// The code point under the cursor, or [`END_OF_TEXT`] past the end.
    pub fn head(&self) -> char {
        self.chars.get(self.position).copied().unwrap_or(END_OF_TEXT)
    }

    /// The code point after the cursor, or [`END_OF_TEXT`].
    pub fn peek(&self) -> char {
        self.peek_at(1)
    }

    /// The code point `n` places past the cursor, or [`END_OF_TEXT`].
    pub fn peek_at(&self, n: usize) -> char {
        self.chars
            .get(self.position + n)
            .copied()
            .unwrap_or(END_OF_TEXT)
    }

    pub fn advance(&mut self) {
        if self.position < self.chars.len() {
            self.position += 1;
        }
    }

    /// Byte offset of the cursor into the normalized source.
    pub fn count(&self) -> usize {
        self.offsets[self.position.min(self.offsets.len() - 1)]
    }

    /// Consume the head code point into the lexeme buffer.
    pub fn collect(&mut self) {
        if self.has() {
            self.buffer.push(self.head());
            self.advance();
        }
    }

    /// Check whether the source at the cursor starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        let mut position = self.position;
        for expected in prefix.chars() {
            if self.chars.get(position) != Some(&expected) {
                return false;
            }
            position += 1;
        }
        true
    }

    /// Drain and return the accumulated lexeme.
    pub fn pop(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_and_advance() {
        let mut reader = Reader::new("ab");
        assert!(reader.has());
        assert_eq!(reader.head(), 'a');
        reader.advance();
        assert_eq!(reader.head(), 'b');
        reader.advance();
        assert!(!reader.has());
        assert_eq!(reader.head(), END_OF_TEXT);
    }

    #[test]
    fn test_byte_offsets_multibyte() {
        let mut reader = Reader::new("é=1");
        assert_eq!(reader.count(), 0);
        reader.advance();
        assert_eq!(reader.count(), 2);
        reader.advance();
        assert_eq!(reader.count(), 3);
    }

    #[test]
    fn test_nfc_normalization() {
        // 'e' + combining acute composes to a single code point
        let reader = Reader::new("e\u{0301}");
        assert_eq!(reader.source(), "\u{00e9}");
    }

    #[test]
    fn test_collect_pop() {
        let mut reader = Reader::new("abc");
        reader.collect();
        reader.collect();
        assert_eq!(reader.pop(), "ab");
        assert_eq!(reader.head(), 'c');
        assert_eq!(reader.pop(), "");
    }
}
