//! SQL tokenizer implementation.

use super::{Delimiter, Quote, Span, Token};
use crate::encoding::{EncodedCursor, Encoding, Unit};

/// Default bound on the bytes kept for one token body.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 256;

/// A tokenizer over statement bytes in a given client encoding.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    cursor: EncodedCursor<'a>,
    /// Whether `\` escapes inside every `'...'` literal.
    backslash_escapes: bool,
    max_token_len: usize,
    /// The byte position of the start of the current token.
    start: usize,
}

/// Token body under construction, bounded by the token buffer size.
struct TokenBuf {
    bytes: Vec<u8>,
    max: usize,
    truncated: bool,
}

impl TokenBuf {
    const fn new(max: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max,
            truncated: false,
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        if self.truncated || self.bytes.len() + bytes.len() > self.max {
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(bytes);
        }
    }

    fn push_unit(&mut self, unit: Unit<'_>) {
        match unit {
            Unit::Ascii(b) => self.push_bytes(&[b]),
            Unit::Multibyte(bytes) => self.push_bytes(bytes),
        }
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.truncated = false;
    }
}

/// Skips whitespace and comments, and leading commas when asked.
fn skip_blank(cursor: &mut EncodedCursor<'_>, skip_commas: bool) {
    loop {
        match cursor.peek_unit() {
            Some(Unit::Ascii(b)) if b.is_ascii_whitespace() || (skip_commas && b == b',') => {
                cursor.next_unit();
            }
            Some(Unit::Ascii(b'-')) if cursor.peek_second_unit() == Some(Unit::Ascii(b'-')) => {
                while let Some(unit) = cursor.next_unit() {
                    if unit.is(b'\n') {
                        break;
                    }
                }
            }
            Some(Unit::Ascii(b'/')) if cursor.peek_second_unit() == Some(Unit::Ascii(b'*')) => {
                cursor.skip(2);
                // Block comments nest.
                let mut depth = 1usize;
                while depth > 0 {
                    match cursor.next_unit() {
                        None => break,
                        Some(Unit::Ascii(b'*')) if cursor.peek_unit() == Some(Unit::Ascii(b'/')) => {
                            cursor.next_unit();
                            depth -= 1;
                        }
                        Some(Unit::Ascii(b'/')) if cursor.peek_unit() == Some(Unit::Ascii(b'*')) => {
                            cursor.next_unit();
                            depth += 1;
                        }
                        Some(_) => {}
                    }
                }
            }
            _ => break,
        }
    }
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over `input` in the given encoding.
    #[must_use]
    pub const fn new(input: &'a [u8], encoding: Encoding) -> Self {
        Self {
            cursor: EncodedCursor::new(input, encoding),
            backslash_escapes: false,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            start: 0,
        }
    }

    /// Makes `\` an escape character inside every `'...'` literal, not only
    /// inside `E'...'`.
    #[must_use]
    pub const fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    /// Sets the token buffer bound. Longer bodies are truncated.
    #[must_use]
    pub const fn with_max_token_len(mut self, max: usize) -> Self {
        self.max_token_len = max;
        self
    }

    /// Returns the byte offset of the next unread byte.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Scans a `'...'` literal body; the opening quote is already consumed.
    fn scan_string(&mut self, buf: &mut TokenBuf, escapes: bool) {
        loop {
            match self.cursor.next_unit() {
                None => break,
                Some(Unit::Ascii(b'\'')) => {
                    if self.cursor.peek_unit() == Some(Unit::Ascii(b'\'')) {
                        self.cursor.next_unit();
                        buf.push_bytes(b"'");
                    } else {
                        break;
                    }
                }
                Some(Unit::Ascii(b'\\')) if escapes => {
                    buf.push_bytes(b"\\");
                    if let Some(escaped) = self.cursor.next_unit() {
                        buf.push_unit(escaped);
                    }
                }
                Some(unit) => buf.push_unit(unit),
            }
        }
    }

    /// Scans a `"..."` identifier body; the opening quote is already consumed.
    fn scan_quoted_identifier(&mut self, buf: &mut TokenBuf) {
        loop {
            match self.cursor.next_unit() {
                None => break,
                Some(Unit::Ascii(b'"')) => {
                    if self.cursor.peek_unit() == Some(Unit::Ascii(b'"')) {
                        self.cursor.next_unit();
                        buf.push_bytes(b"\"");
                    } else {
                        break;
                    }
                }
                Some(unit) => buf.push_unit(unit),
            }
        }
    }

    /// Returns the `$tag$` opener at the cursor, if there is one.
    ///
    /// The tag is empty or an identifier that does not start with a digit,
    /// so `$1` stays a positional parameter.
    fn dollar_tag(&self) -> Option<&'a [u8]> {
        let mut probe = self.cursor;
        let start = probe.position();
        if !probe.next_unit()?.is(b'$') {
            return None;
        }
        let mut first = true;
        loop {
            match probe.next_unit()? {
                Unit::Ascii(b'$') => break,
                Unit::Ascii(b) if b.is_ascii_digit() && !first => {}
                Unit::Ascii(b) if b.is_ascii_alphabetic() || b == b'_' => {}
                Unit::Multibyte(_) => {}
                Unit::Ascii(_) => return None,
            }
            first = false;
        }
        Some(&self.cursor.input()[start..probe.position()])
    }

    /// Scans a dollar-quoted body up to the repeat of `tag`.
    fn scan_dollar(&mut self, buf: &mut TokenBuf, tag: &[u8]) {
        self.cursor.skip(tag.len());
        loop {
            if self.cursor.starts_with(tag) {
                self.cursor.skip(tag.len());
                break;
            }
            match self.cursor.next_unit() {
                None => break,
                Some(unit) => buf.push_unit(unit),
            }
        }
    }

    /// Scans a numeric literal: a digit followed by letters, digits and dots.
    fn scan_number(&mut self, buf: &mut TokenBuf) {
        while let Some(Unit::Ascii(b)) = self.cursor.peek_unit() {
            if !(b.is_ascii_alphanumeric() || b == b'.') {
                break;
            }
            self.cursor.next_unit();
            buf.push_bytes(&[b]);
        }
    }

    /// Scans a word. A one-letter `E`, `N`, `B` or `X` directly followed by
    /// a quote is a string constant prefix instead.
    fn scan_word(&mut self, buf: &mut TokenBuf) -> Quote {
        while let Some(unit) = self.cursor.peek_unit() {
            match unit {
                Unit::Multibyte(_) => {}
                Unit::Ascii(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' => {}
                Unit::Ascii(_) => break,
            }
            self.cursor.next_unit();
            buf.push_unit(unit);
        }

        if buf.bytes.len() == 1 && self.cursor.peek_unit() == Some(Unit::Ascii(b'\'')) {
            let prefix = buf.bytes[0].to_ascii_uppercase();
            if matches!(prefix, b'E' | b'N' | b'B' | b'X') {
                buf.clear();
                self.cursor.next_unit();
                self.scan_string(buf, prefix == b'E' || self.backslash_escapes);
                return Quote::Single;
            }
        }
        Quote::None
    }

    /// Looks past trailing whitespace to classify what follows the token.
    fn trailing_delimiter(&self) -> Delimiter {
        let mut probe = self.cursor;
        skip_blank(&mut probe, false);
        match probe.peek_unit() {
            None => Delimiter::End,
            Some(Unit::Ascii(b',')) => Delimiter::Comma,
            Some(_) => Delimiter::Space,
        }
    }

    /// Scans the next token. Returns `None` at the end of input.
    ///
    /// Leading whitespace, comments and commas are skipped; commas are only
    /// reported through [`Token::delimiter`].
    pub fn next_token(&mut self) -> Option<Token> {
        skip_blank(&mut self.cursor, true);
        self.start = self.cursor.position();
        let first = self.cursor.peek_unit()?;

        let mut buf = TokenBuf::new(self.max_token_len);
        let mut quote = Quote::None;
        let mut numeric = false;

        match first {
            Unit::Ascii(b'\'') => {
                self.cursor.next_unit();
                self.scan_string(&mut buf, self.backslash_escapes);
                quote = Quote::Single;
            }
            Unit::Ascii(b'"') => {
                self.cursor.next_unit();
                self.scan_quoted_identifier(&mut buf);
                quote = Quote::Double;
            }
            Unit::Ascii(b'$') => {
                if let Some(tag) = self.dollar_tag() {
                    self.scan_dollar(&mut buf, tag);
                    quote = Quote::Dollar;
                } else {
                    self.cursor.next_unit();
                    buf.push_bytes(b"$");
                }
            }
            Unit::Ascii(b) if b.is_ascii_digit() => {
                self.scan_number(&mut buf);
                numeric = true;
            }
            Unit::Ascii(b) if b != b'_' && !b.is_ascii_alphanumeric() => {
                self.cursor.next_unit();
                buf.push_bytes(&[b]);
            }
            _ => quote = self.scan_word(&mut buf),
        }

        Some(Token {
            text: buf.bytes,
            span: Span::new(self.start, self.cursor.position()),
            delimiter: self.trailing_delimiter(),
            quote,
            numeric,
            truncated: buf.truncated,
        })
    }

    /// Tokenizes the rest of the input.
    #[must_use]
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }
}
