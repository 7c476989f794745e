//! Multibyte-aware byte cursor.
//!
//! The scanner walks statement text byte by byte, but in East Asian
//! encodings the trailing bytes of a wide character may fall in the ASCII
//! range (a Shift-JIS trail byte can be `\` or `'`). [`EncodedCursor`] runs
//! the lead/continuation state machine of the connection encoding so callers
//! can tell punctuation from the inside of a wide character.

use std::env;

/// Client encodings the cursor distinguishes.
///
/// Every single-byte encoding collapses to [`Encoding::SingleByte`]: only the
/// multibyte ones need a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// SQL_ASCII, LATINn, WINxxxx, KOI8 and friends.
    #[default]
    SingleByte,
    /// UTF-8 (1 to 6 byte sequences are recognized).
    Utf8,
    /// EUC_JP and EUC_JIS_2004.
    EucJp,
    /// EUC_CN.
    EucCn,
    /// EUC_KR.
    EucKr,
    /// EUC_TW (up to 4 bytes).
    EucTw,
    /// JOHAB.
    Johab,
    /// Shift-JIS and its Windows variants.
    Sjis,
    /// Big5.
    Big5,
    /// GBK.
    Gbk,
    /// UHC (Windows 949).
    Uhc,
    /// GB18030 (2 or 4 bytes).
    Gb18030,
}

impl Encoding {
    /// Looks up an encoding by server or alias name.
    ///
    /// Matching ignores case, `-` and `_`. Returns `None` for names that are
    /// not recognized at all; callers degrade those to single-byte.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let encoding = match normalized.as_str() {
            "UTF8" | "UNICODE" => Self::Utf8,
            "EUCJP" | "EUCJIS2004" => Self::EucJp,
            "EUCCN" => Self::EucCn,
            "EUCKR" => Self::EucKr,
            "EUCTW" => Self::EucTw,
            "JOHAB" => Self::Johab,
            "SJIS" | "SHIFTJIS" | "SHIFTJIS2004" | "MSKANJI" | "WIN932" | "WINDOWS932"
            | "CP932" | "MS932" => Self::Sjis,
            "BIG5" | "WIN950" | "WINDOWS950" | "CP950" => Self::Big5,
            "GBK" | "WIN936" | "WINDOWS936" | "CP936" => Self::Gbk,
            "UHC" | "WIN949" | "WINDOWS949" | "CP949" => Self::Uhc,
            "GB18030" => Self::Gb18030,
            "SQLASCII" | "ASCII" | "USASCII" | "ALT" | "WIN866" | "WIN874" | "KOI8"
            | "KOI8R" | "KOI8U" | "TCVN" | "TCVN5712" | "ABC" | "VSCII" | "MULEINTERNAL" => {
                Self::SingleByte
            }
            other if is_single_byte_family(other) => Self::SingleByte,
            _ => return None,
        };
        Some(encoding)
    }

    /// Derives an encoding from a POSIX locale string such as
    /// `ja_JP.eucJP` or `en_US.UTF-8@euro`.
    #[must_use]
    pub fn from_locale(locale: &str) -> Option<Self> {
        let (_, codeset) = locale.split_once('.')?;
        let codeset = codeset.split('@').next().unwrap_or(codeset);
        Self::from_name(codeset)
    }

    /// Reads `LC_ALL`, `LC_CTYPE` and `LANG` in that order and derives the
    /// encoding from the first one that is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .filter_map(|var| env::var(var).ok())
            .find(|value| !value.is_empty())
            .and_then(|value| Self::from_locale(&value))
    }

    /// Returns true if characters may span more than one byte.
    #[must_use]
    pub const fn is_multibyte(self) -> bool {
        !matches!(self, Self::SingleByte)
    }

    /// Advances the character state machine by one byte.
    ///
    /// The returned state is 0 when `byte` is a complete single-byte
    /// character, 1 when it is the final byte of a multibyte character, and
    /// greater than 1 when more bytes of the same character follow.
    #[must_use]
    pub const fn next_state(self, state: u8, byte: u8) -> u8 {
        if byte == 0 {
            return 0;
        }
        match self {
            Self::SingleByte => 0,
            Self::Utf8 => {
                if state < 2 && byte >= 0x80 {
                    if byte >= 0xfc {
                        6
                    } else if byte >= 0xf8 {
                        5
                    } else if byte >= 0xf0 {
                        4
                    } else if byte >= 0xe0 {
                        3
                    } else if byte >= 0xc0 {
                        2
                    } else {
                        0
                    }
                } else if state >= 2 && byte > 0x7f {
                    state - 1
                } else {
                    0
                }
            }
            Self::Sjis => {
                if state < 2 && byte > 0x80 && !(byte > 0x9f && byte < 0xe0) {
                    2
                } else if state == 2 {
                    1
                } else {
                    0
                }
            }
            Self::Big5 | Self::EucCn | Self::EucKr | Self::Johab => {
                if state < 2 && byte > 0xa0 {
                    2
                } else if state == 2 {
                    1
                } else {
                    0
                }
            }
            Self::Gbk | Self::Uhc => {
                if state < 2 && byte > 0x7f {
                    2
                } else if state == 2 {
                    1
                } else {
                    0
                }
            }
            Self::EucJp => {
                if state < 3 && byte == 0x8f {
                    3
                } else if state != 2 && (byte == 0x8e || byte > 0xa0) {
                    2
                } else if state == 2 {
                    1
                } else {
                    0
                }
            }
            Self::EucTw => {
                if state < 4 && byte == 0x8e {
                    4
                } else if state == 4 && byte > 0xa0 {
                    3
                } else if (state == 3 || state < 2) && byte > 0xa0 {
                    2
                } else if state == 2 {
                    1
                } else {
                    0
                }
            }
            Self::Gb18030 => {
                if state < 2 && byte > 0x80 {
                    2
                } else if state == 2 {
                    if byte.is_ascii_digit() { 3 } else { 1 }
                } else if state == 3 {
                    if byte.is_ascii_digit() { 1 } else { 3 }
                } else {
                    0
                }
            }
        }
    }
}

fn is_single_byte_family(name: &str) -> bool {
    ["LATIN", "ISO8859", "WIN125", "WINDOWS125", "CP125"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// One byte read through the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedByte {
    /// The raw byte.
    pub byte: u8,
    /// Encoding state after this byte (see [`Encoding::next_state`]).
    pub state: u8,
}

impl EncodedByte {
    /// Returns true if this byte belongs to a multibyte character and must
    /// never be read as ASCII punctuation.
    #[must_use]
    pub const fn in_multibyte(self) -> bool {
        self.state != 0
    }

    /// Returns true if more bytes of the same character follow.
    #[must_use]
    pub const fn is_continued(self) -> bool {
        self.state > 1
    }

    /// Returns the byte as ASCII if it stands on its own.
    #[must_use]
    pub const fn ascii(self) -> Option<u8> {
        if self.state == 0 && self.byte < 0x80 {
            Some(self.byte)
        } else {
            None
        }
    }
}

/// One logical character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit<'a> {
    /// A standalone ASCII byte.
    Ascii(u8),
    /// Every byte of a non-ASCII character, copied verbatim.
    Multibyte(&'a [u8]),
}

impl Unit<'_> {
    /// Returns the number of bytes in this unit.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Ascii(_) => 1,
            Self::Multibyte(bytes) => bytes.len(),
        }
    }

    /// Always false: a unit holds at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns the ASCII byte if this is an ASCII unit.
    #[must_use]
    pub const fn ascii(&self) -> Option<u8> {
        match self {
            Self::Ascii(b) => Some(*b),
            Self::Multibyte(_) => None,
        }
    }

    /// Returns true if this is the given ASCII byte.
    #[must_use]
    pub const fn is(&self, byte: u8) -> bool {
        matches!(self, Self::Ascii(b) if *b == byte)
    }
}

/// A byte cursor that never splits a multibyte character.
#[derive(Debug, Clone, Copy)]
pub struct EncodedCursor<'a> {
    input: &'a [u8],
    encoding: Encoding,
    pos: usize,
    state: u8,
}

impl<'a> EncodedCursor<'a> {
    /// Creates a cursor at the start of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8], encoding: Encoding) -> Self {
        Self {
            input,
            encoding,
            pos: 0,
            state: 0,
        }
    }

    /// Returns the byte offset of the next unread byte.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the encoding this cursor decodes.
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the whole input.
    #[must_use]
    pub const fn input(&self) -> &'a [u8] {
        self.input
    }

    /// Returns the unread remainder of the input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true when every byte has been consumed.
    #[must_use]
    pub const fn is_at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Returns the state left by the last consumed byte.
    #[must_use]
    pub const fn state(&self) -> u8 {
        self.state
    }

    /// Consumes one byte and reports its encoding state.
    pub fn advance(&mut self) -> Option<EncodedByte> {
        let byte = *self.input.get(self.pos)?;
        self.state = self.encoding.next_state(self.state, byte);
        self.pos += 1;
        Some(EncodedByte {
            byte,
            state: self.state,
        })
    }

    /// Consumes one whole character.
    pub fn next_unit(&mut self) -> Option<Unit<'a>> {
        let start = self.pos;
        let first = self.advance()?;
        if let Some(b) = first.ascii() {
            return Some(Unit::Ascii(b));
        }
        while self.state > 1 {
            let Some(&byte) = self.input.get(self.pos) else {
                break;
            };
            let next = self.encoding.next_state(self.state, byte);
            if next == 0 {
                // Truncated sequence: the byte starts a new character.
                self.state = 0;
                break;
            }
            self.state = next;
            self.pos += 1;
        }
        Some(Unit::Multibyte(&self.input[start..self.pos]))
    }

    /// Returns the next character without consuming it.
    #[must_use]
    pub fn peek_unit(&self) -> Option<Unit<'a>> {
        let mut probe = *self;
        probe.next_unit()
    }

    /// Returns the character after the next one without consuming either.
    #[must_use]
    pub fn peek_second_unit(&self) -> Option<Unit<'a>> {
        let mut probe = *self;
        probe.next_unit()?;
        probe.next_unit()
    }

    /// Moves forward by `n` bytes, running every skipped byte through the
    /// state machine so the multibyte state stays consistent.
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            if self.advance().is_none() {
                break;
            }
        }
    }

    /// Walks the cursor to the absolute byte `offset` and returns the byte
    /// there with the state it has in context. Offsets behind the cursor
    /// restart the walk from the beginning of the input.
    pub fn walk_to(&mut self, offset: usize) -> Option<EncodedByte> {
        if offset < self.pos {
            self.pos = 0;
            self.state = 0;
        }
        self.skip(offset - self.pos);
        let mut probe = *self;
        probe.advance()
    }

    /// Returns true if the unread input starts with `prefix` on a character
    /// boundary.
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.state <= 1 && self.remaining().starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(input: &[u8], encoding: Encoding) -> Vec<Vec<u8>> {
        let mut cursor = EncodedCursor::new(input, encoding);
        let mut out = Vec::new();
        while let Some(unit) = cursor.next_unit() {
            out.push(match unit {
                Unit::Ascii(b) => vec![b],
                Unit::Multibyte(bytes) => bytes.to_vec(),
            });
        }
        out
    }

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(Encoding::from_name("UNICODE"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("Shift_JIS"), Some(Encoding::Sjis));
        assert_eq!(Encoding::from_name("WIN932"), Some(Encoding::Sjis));
        assert_eq!(Encoding::from_name("euc_jis_2004"), Some(Encoding::EucJp));
        assert_eq!(Encoding::from_name("LATIN1"), Some(Encoding::SingleByte));
        assert_eq!(Encoding::from_name("WIN1252"), Some(Encoding::SingleByte));
        assert_eq!(Encoding::from_name("klingon"), None);
    }

    #[test]
    fn test_from_locale() {
        assert_eq!(Encoding::from_locale("ja_JP.eucJP"), Some(Encoding::EucJp));
        assert_eq!(
            Encoding::from_locale("en_US.UTF-8@euro"),
            Some(Encoding::Utf8)
        );
        assert_eq!(Encoding::from_locale("C"), None);
    }

    #[test]
    fn test_utf8_units() {
        let text = "aé中😀".as_bytes();
        let got = units(text, Encoding::Utf8);
        assert_eq!(got.len(), 4);
        assert_eq!(got[1].len(), 2);
        assert_eq!(got[2].len(), 3);
        assert_eq!(got[3].len(), 4);
    }

    #[test]
    fn test_sjis_trail_byte_is_not_punctuation() {
        // 0x81 0x27: lead byte followed by a trail byte equal to '\''.
        let mut cursor = EncodedCursor::new(&[0x81, b'\'', b'\''], Encoding::Sjis);
        let lead = cursor.advance().unwrap();
        assert!(lead.is_continued());
        let trail = cursor.advance().unwrap();
        assert!(trail.in_multibyte());
        assert_eq!(trail.ascii(), None);
        let quote = cursor.advance().unwrap();
        assert_eq!(quote.ascii(), Some(b'\''));
    }

    #[test]
    fn test_sjis_half_width_katakana_is_single() {
        let got = units(&[0xb1, b'a'], Encoding::Sjis);
        assert_eq!(got, vec![vec![0xb1], vec![b'a']]);
    }

    #[test]
    fn test_euc_jp_three_byte() {
        let got = units(&[0x8f, 0xa1, 0xa1, b'x'], Encoding::EucJp);
        assert_eq!(got, vec![vec![0x8f, 0xa1, 0xa1], vec![b'x']]);
    }

    #[test]
    fn test_euc_tw_four_byte() {
        let got = units(&[0x8e, 0xa2, 0xa1, 0xa1, b','], Encoding::EucTw);
        assert_eq!(got, vec![vec![0x8e, 0xa2, 0xa1, 0xa1], vec![b',']]);
    }

    #[test]
    fn test_gb18030_four_byte() {
        let got = units(&[0x81, 0x30, 0x81, 0x30, b'y'], Encoding::Gb18030);
        assert_eq!(got, vec![vec![0x81, 0x30, 0x81, 0x30], vec![b'y']]);
    }

    #[test]
    fn test_gbk_trail_byte_equal_to_comma_range() {
        // GBK trail bytes start at 0x40; a lead byte swallows what follows.
        let got = units(&[0x81, 0x40, b','], Encoding::Gbk);
        assert_eq!(got, vec![vec![0x81, 0x40], vec![b',']]);
    }

    #[test]
    fn test_truncated_utf8_does_not_swallow_ascii() {
        let got = units(&[0xe4, b',', b'a'], Encoding::Utf8);
        assert_eq!(got, vec![vec![0xe4], vec![b','], vec![b'a']]);
    }

    #[test]
    fn test_single_byte_high_bytes_are_not_ascii() {
        let got = units(&[0xe9, b','], Encoding::SingleByte);
        assert_eq!(got, vec![vec![0xe9], vec![b',']]);
    }

    #[test]
    fn test_skip_keeps_state() {
        let mut cursor = EncodedCursor::new(&[0x81, 0x27, b'a'], Encoding::Sjis);
        cursor.skip(1);
        assert_eq!(cursor.state(), 2);
        let trail = cursor.advance().unwrap();
        assert!(trail.in_multibyte());
    }

    #[test]
    fn test_walk_to_reports_context_state() {
        let input = [b'a', 0x81, 0x2c, b','];
        let mut cursor = EncodedCursor::new(&input, Encoding::Sjis);
        let inside = cursor.walk_to(2).unwrap();
        assert!(inside.in_multibyte());
        let outside = cursor.walk_to(3).unwrap();
        assert_eq!(outside.ascii(), Some(b','));
        let again = cursor.walk_to(2).unwrap();
        assert!(again.in_multibyte());
    }
}
