//! Token types produced by the tokenizer.

use super::Span;

/// What follows a token once trailing whitespace is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    /// A comma follows.
    Comma,
    /// Anything else follows (a keyword boundary, punctuation, a new word).
    Space,
    /// The input ends.
    End,
}

/// How a token was quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// Not quoted.
    None,
    /// A `'...'` string literal (including `E'...'`, `N'...'`, `B'...'`, `X'...'`).
    Single,
    /// A `$tag$...$tag$` literal.
    Dollar,
    /// A `"..."` quoted identifier.
    Double,
}

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token body. Quotes are stripped and doubled quote characters
    /// collapsed; backslash escapes are kept verbatim.
    pub text: Vec<u8>,
    /// Where the token sits in the statement, quotes and prefixes included.
    pub span: Span,
    /// What follows the token.
    pub delimiter: Delimiter,
    /// How the token was quoted.
    pub quote: Quote,
    /// True for a numeric literal.
    pub numeric: bool,
    /// True if the body was longer than the token buffer and got cut.
    pub truncated: bool,
}

impl Token {
    /// Returns true for a `'...'` or dollar-quoted literal.
    #[must_use]
    pub const fn is_single_quoted(&self) -> bool {
        matches!(self.quote, Quote::Single | Quote::Dollar)
    }

    /// Returns true for a `"..."` identifier.
    #[must_use]
    pub const fn is_double_quoted(&self) -> bool {
        matches!(self.quote, Quote::Double)
    }

    /// Returns true for a numeric literal.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        self.numeric
    }

    /// Returns true if the token is neither quoted nor numeric.
    #[must_use]
    pub const fn is_bare(&self) -> bool {
        matches!(self.quote, Quote::None) && !self.numeric
    }

    /// Returns true if the token is the single punctuation character `c`.
    #[must_use]
    pub fn is_punct(&self, c: u8) -> bool {
        self.is_bare() && self.text.len() == 1 && self.text[0] == c
    }

    /// Returns true for an unquoted single-character punctuation token.
    #[must_use]
    pub fn is_punctuation(&self) -> bool {
        self.is_bare()
            && self.text.len() == 1
            && !self.text[0].is_ascii_alphanumeric()
            && self.text[0] != b'_'
            && self.text[0] < 0x80
    }

    /// Returns true for an unquoted word: a bare token that is not punctuation.
    #[must_use]
    pub fn is_word(&self) -> bool {
        self.is_bare() && !self.text.is_empty() && !self.is_punctuation()
    }

    /// Returns true if the token is the unquoted keyword `keyword`
    /// (ASCII, case-insensitive).
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.is_bare() && self.text.eq_ignore_ascii_case(keyword.as_bytes())
    }

    /// Returns true if the token is any of the given unquoted keywords.
    #[must_use]
    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.is_keyword(k))
    }

    /// Returns true if a comma follows the token.
    #[must_use]
    pub const fn followed_by_comma(&self) -> bool {
        matches!(self.delimiter, Delimiter::Comma)
    }

    /// Renders the body as text, replacing invalid UTF-8.
    #[must_use]
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(text: &str) -> Token {
        Token {
            text: text.as_bytes().to_vec(),
            span: Span::new(0, text.len()),
            delimiter: Delimiter::Space,
            quote: Quote::None,
            numeric: false,
            truncated: false,
        }
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        assert!(bare("SeLeCt").is_keyword("select"));
        assert!(!bare("selects").is_keyword("select"));
    }

    #[test]
    fn test_quoted_word_is_not_keyword() {
        let mut token = bare("from");
        token.quote = Quote::Double;
        assert!(!token.is_keyword("from"));
        assert!(token.is_double_quoted());
        assert!(!token.is_word());
    }

    #[test]
    fn test_punctuation() {
        assert!(bare("(").is_punct(b'('));
        assert!(bare("*").is_punctuation());
        assert!(!bare("_").is_punctuation());
        assert!(bare("abc").is_word());
    }
}
