//! C-style path unquoting.
//!
//! Without `-z`, git wraps paths containing control characters, quotes,
//! backslashes or (by default) non-ASCII bytes in double quotes and escapes
//! them the way C string literals do.

use crate::{ParseError, ParseErrorKind, Result};
use plumbline_core::StringUtf8;

/// Decodes a path field, unquoting it when it is wrapped in double quotes.
///
/// `offset` is the stream offset of `field`, used for error reporting.
pub fn unquote_path(field: &[u8], offset: usize) -> Result<StringUtf8> {
    if field.len() < 2 || field[0] != b'"' || field[field.len() - 1] != b'"' {
        return Ok(StringUtf8::from(field));
    }

    let inner = &field[1..field.len() - 1];
    let invalid = |at: usize| ParseError::at(ParseErrorKind::InvalidQuoting, field, at + 1).shifted(offset);
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let escaped = *inner.get(i + 1).ok_or_else(|| invalid(i))?;
        let value = match escaped {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            b'"' => b'"',
            b'\\' => b'\\',
            b'0'..=b'3' => {
                let digits = inner.get(i + 1..i + 4).ok_or_else(|| invalid(i))?;
                if !digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                    return Err(invalid(i));
                }
                let value = digits
                    .iter()
                    .fold(0u8, |acc, d| (acc << 3) | (d - b'0'));
                out.push(value);
                i += 4;
                continue;
            }
            _ => return Err(invalid(i)),
        };
        out.push(value);
        i += 2;
    }
    Ok(StringUtf8::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path_unchanged() {
        assert_eq!(unquote_path(b"src/main.rs", 0).unwrap(), "src/main.rs");
        assert_eq!(unquote_path(b"\"", 0).unwrap(), "\"");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(unquote_path(br#""tab\there""#, 0).unwrap(), "tab\there");
        assert_eq!(unquote_path(br#""quote\"d""#, 0).unwrap(), "quote\"d");
        assert_eq!(unquote_path(br#""back\\slash""#, 0).unwrap(), "back\\slash");
    }

    #[test]
    fn test_octal_utf8() {
        assert_eq!(
            unquote_path(br#""caf\303\251.txt""#, 0).unwrap(),
            "café.txt"
        );
    }

    #[test]
    fn test_malformed() {
        let err = unquote_path(br#""bad\q""#, 100).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidQuoting));
        assert_eq!(err.offset(), 104);
        assert!(unquote_path(br#""end\""#, 0).is_err());
        assert!(unquote_path(br#""\30""#, 0).is_err());
    }
}
