//! Size, precision and display width of built-in PostgreSQL types.

use serde::Serialize;

use crate::catalog::Oid;

pub const BOOL: Oid = 16;
pub const BYTEA: Oid = 17;
pub const CHAR: Oid = 18;
pub const NAME: Oid = 19;
pub const INT8: Oid = 20;
pub const INT2: Oid = 21;
pub const INT4: Oid = 23;
pub const TEXT: Oid = 25;
pub const OID: Oid = 26;
pub const JSON: Oid = 114;
pub const FLOAT4: Oid = 700;
pub const FLOAT8: Oid = 701;
pub const BPCHAR: Oid = 1042;
pub const VARCHAR: Oid = 1043;
pub const DATE: Oid = 1082;
pub const TIME: Oid = 1083;
pub const TIMESTAMP: Oid = 1114;
pub const TIMESTAMPTZ: Oid = 1184;
pub const INTERVAL: Oid = 1186;
pub const TIMETZ: Oid = 1266;
pub const NUMERIC: Oid = 1700;
pub const UUID: Oid = 2950;
pub const JSONB: Oid = 3802;

/// Type modifiers of length-limited types carry this header.
const VARHDRSZ: i32 = 4;
/// `NAMEDATALEN - 1`.
const MAX_NAME_LEN: u32 = 63;
const DEFAULT_NUMERIC_PRECISION: u32 = 28;
const DEFAULT_NUMERIC_SCALE: u16 = 6;
const DEFAULT_FRACTION_DIGITS: u16 = 6;

/// What a client needs to lay out a column of a given type.
///
/// `None` means the type has no fixed bound (`text`, `bytea`, unknown
/// types, or an unconstrained `varchar`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeMetadata {
    /// Declared size: characters for strings, digits for numbers.
    pub column_size: Option<u32>,
    /// Digits after the decimal point (or fractional seconds).
    pub decimal_digits: Option<u16>,
    /// Characters needed to display any value.
    pub display_size: Option<u32>,
}

impl TypeMetadata {
    const fn sized(column_size: u32, display_size: u32, decimal_digits: Option<u16>) -> Self {
        Self {
            column_size: Some(column_size),
            decimal_digits,
            display_size: Some(display_size),
        }
    }
}

/// Fractional second digits from a datetime type modifier.
fn fraction_digits(type_modifier: i32) -> u16 {
    u16::try_from(type_modifier)
        .ok()
        .filter(|p| *p <= 6)
        .unwrap_or(DEFAULT_FRACTION_DIGITS)
}

/// Width added by `.ffffff` for `digits` fractional digits.
fn fraction_width(digits: u16) -> u32 {
    if digits == 0 { 0 } else { u32::from(digits) + 1 }
}

/// Returns layout metadata for a type OID and modifier.
#[must_use]
pub fn type_metadata(type_oid: Oid, type_modifier: i32) -> TypeMetadata {
    match type_oid {
        BOOL | CHAR => TypeMetadata::sized(1, 1, None),
        INT2 => TypeMetadata::sized(5, 6, Some(0)),
        INT4 => TypeMetadata::sized(10, 11, Some(0)),
        INT8 => TypeMetadata::sized(19, 20, Some(0)),
        OID => TypeMetadata::sized(10, 10, Some(0)),
        FLOAT4 => TypeMetadata::sized(7, 15, None),
        FLOAT8 => TypeMetadata::sized(15, 24, None),
        NUMERIC => {
            let (precision, scale) = if type_modifier >= VARHDRSZ {
                let packed = type_modifier - VARHDRSZ;
                (
                    u32::try_from((packed >> 16) & 0xffff).unwrap_or(DEFAULT_NUMERIC_PRECISION),
                    u16::try_from(packed & 0xffff).unwrap_or(DEFAULT_NUMERIC_SCALE),
                )
            } else {
                (DEFAULT_NUMERIC_PRECISION, DEFAULT_NUMERIC_SCALE)
            };
            // Sign and decimal point.
            TypeMetadata::sized(precision, precision + 2, Some(scale))
        }
        NAME => TypeMetadata::sized(MAX_NAME_LEN, MAX_NAME_LEN, None),
        BPCHAR | VARCHAR => u32::try_from(type_modifier - VARHDRSZ)
            .ok()
            .filter(|_| type_modifier >= VARHDRSZ)
            .map_or_else(TypeMetadata::default, |len| TypeMetadata::sized(len, len, None)),
        DATE => TypeMetadata::sized(10, 10, None),
        TIME => {
            let digits = fraction_digits(type_modifier);
            let size = 8 + fraction_width(digits);
            TypeMetadata::sized(size, size, Some(digits))
        }
        TIMETZ => {
            let digits = fraction_digits(type_modifier);
            let size = 8 + fraction_width(digits) + 3;
            TypeMetadata::sized(size, size, Some(digits))
        }
        TIMESTAMP => {
            let digits = fraction_digits(type_modifier);
            let size = 19 + fraction_width(digits);
            TypeMetadata::sized(size, size, Some(digits))
        }
        TIMESTAMPTZ => {
            let digits = fraction_digits(type_modifier);
            let size = 19 + fraction_width(digits) + 3;
            TypeMetadata::sized(size, size, Some(digits))
        }
        INTERVAL => TypeMetadata {
            column_size: None,
            decimal_digits: Some(fraction_digits(type_modifier & 0xffff)),
            display_size: None,
        },
        UUID => TypeMetadata::sized(36, 36, None),
        // text, bytea, json and jsonb are unbounded.
        _ => TypeMetadata::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers() {
        assert_eq!(type_metadata(INT4, -1).column_size, Some(10));
        assert_eq!(type_metadata(INT8, -1).display_size, Some(20));
        assert_eq!(type_metadata(INT2, -1).decimal_digits, Some(0));
    }

    #[test]
    fn test_numeric_precision_and_scale() {
        // numeric(10,2)
        let meta = type_metadata(NUMERIC, (10 << 16) + 2 + 4);
        assert_eq!(meta.column_size, Some(10));
        assert_eq!(meta.decimal_digits, Some(2));
        assert_eq!(meta.display_size, Some(12));
    }

    #[test]
    fn test_unconstrained_numeric() {
        let meta = type_metadata(NUMERIC, -1);
        assert_eq!(meta.column_size, Some(28));
        assert_eq!(meta.decimal_digits, Some(6));
    }

    #[test]
    fn test_varchar_length() {
        assert_eq!(type_metadata(VARCHAR, 24).column_size, Some(20));
        assert_eq!(type_metadata(VARCHAR, -1).column_size, None);
        assert_eq!(type_metadata(BPCHAR, 5).column_size, Some(1));
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(type_metadata(TIMESTAMP, -1).column_size, Some(26));
        assert_eq!(type_metadata(TIMESTAMP, 0).column_size, Some(19));
        assert_eq!(type_metadata(TIMESTAMPTZ, 3).column_size, Some(26));
        assert_eq!(type_metadata(TIME, -1).decimal_digits, Some(6));
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(type_metadata(99_999, -1), TypeMetadata::default());
        assert_eq!(type_metadata(TEXT, -1).column_size, None);
        assert_eq!(type_metadata(JSONB, -1).display_size, None);
    }
}
