//! Identifiers taken from SQL text.
//!
//! Statement text arrives in the connection's client encoding, which is not
//! necessarily UTF-8, so names are kept as raw bytes and only rendered lossily
//! for display and logging.

use std::borrow::Cow;
use std::fmt;

use crate::encoding::{EncodedCursor, Encoding, Unit};

/// A name (or literal body) as it appeared in the statement, in the
/// connection encoding.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(Vec<u8>);

impl Ident {
    /// Creates an identifier from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the identifier as text, replacing invalid UTF-8.
    #[must_use]
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Folds ASCII letters to lower case the way the server folds unquoted
    /// identifiers. Bytes inside multibyte characters are left untouched.
    #[must_use]
    pub fn folded(&self, encoding: Encoding) -> Self {
        let mut out = Vec::with_capacity(self.0.len());
        let mut cursor = EncodedCursor::new(&self.0, encoding);
        while let Some(unit) = cursor.next_unit() {
            match unit {
                Unit::Ascii(b) => out.push(b.to_ascii_lowercase()),
                Unit::Multibyte(bytes) => out.extend_from_slice(bytes),
            }
        }
        Self(out)
    }

    /// Renders the identifier double-quoted, doubling embedded quotes.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.to_str_lossy().replace('"', "\"\""))
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ident({:?})", self.to_str_lossy())
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl AsRef<[u8]> for Ident {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Ident {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for Ident {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Ident {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl PartialEq<str> for Ident {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Ident {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<[u8]> for Ident {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}
