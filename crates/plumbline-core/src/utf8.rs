//! Byte-faithful UTF-8 string views.
//!
//! Paths and names coming out of git are bytes. They are usually UTF-8 but
//! nothing guarantees it, and decoding them lossily would break round trips
//! back into command lines. [`StringUtf8`] keeps the exact bytes and decodes
//! only on demand.

use crate::Result;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

/// An immutable, cheaply clonable view over (usually UTF-8) bytes.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StringUtf8(Bytes);

impl StringUtf8 {
    /// The empty string.
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Wraps a static string without copying.
    pub const fn from_static(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }

    /// Wraps shared bytes without copying.
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of UTF-8 characters (continuation bytes are not counted).
    pub fn char_count(&self) -> usize {
        self.0.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
    }

    /// Byte offset of the `n`th character, or the length if `n` is past the end.
    pub fn char_offset(&self, n: usize) -> usize {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &b)| (b & 0xC0) != 0x80)
            .nth(n)
            .map_or(self.0.len(), |(i, _)| i)
    }

    /// Borrows the contents as `str`, failing on invalid UTF-8.
    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.0)?)
    }

    /// Decodes the contents, replacing invalid sequences.
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Zero-copy byte-range substring.
    pub fn substring(&self, range: Range<usize>) -> Self {
        Self(self.0.slice(range))
    }

    /// Zero-copy character-range substring.
    pub fn substring_chars(&self, start: usize, count: usize) -> Self {
        let from = self.char_offset(start);
        let to = from + Self(self.0.slice(from..)).char_offset(count);
        self.substring(from..to)
    }

    /// Returns true if the bytes start with `prefix`.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns true if the bytes end with `suffix`.
    pub fn ends_with(&self, suffix: &[u8]) -> bool {
        self.0.ends_with(suffix)
    }

    /// Position of the first `byte`.
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        memchr::memchr(byte, &self.0)
    }

    /// Position of the last `byte`.
    pub fn rfind_byte(&self, byte: u8) -> Option<usize> {
        memchr::memrchr(byte, &self.0)
    }

    /// Splits around the first `byte`, excluding it.
    pub fn split_once(&self, byte: u8) -> Option<(Self, Self)> {
        let at = self.find_byte(byte)?;
        Some((self.substring(0..at), self.substring(at + 1..self.len())))
    }

    /// Removes leading and trailing ASCII whitespace.
    pub fn trim(&self) -> Self {
        self.trim_start().trim_end()
    }

    /// Removes leading ASCII whitespace.
    pub fn trim_start(&self) -> Self {
        let start = self
            .0
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.0.len());
        self.substring(start..self.0.len())
    }

    /// Removes trailing ASCII whitespace.
    pub fn trim_end(&self) -> Self {
        let end = self
            .0
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        self.substring(0..end)
    }

    /// Parses the contents as a decimal unsigned integer.
    pub fn parse_u64(&self) -> Option<u64> {
        parse_decimal(&self.0)
    }

    /// Parses the contents as a decimal signed integer.
    pub fn parse_i64(&self) -> Option<i64> {
        match self.0.first() {
            Some(b'-') => parse_decimal(&self.0[1..])
                .and_then(|v| i64::try_from(v).ok())
                .map(|v| -v),
            Some(b'+') => parse_decimal(&self.0[1..]).and_then(|v| i64::try_from(v).ok()),
            _ => parse_decimal(&self.0).and_then(|v| i64::try_from(v).ok()),
        }
    }
}

/// Parses ASCII decimal digits, rejecting empty input and overflow.
pub(crate) fn parse_decimal(digits: &[u8]) -> Option<u64> {
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u64::from(b - b'0'))
        } else {
            None
        }
    })
}

impl From<&[u8]> for StringUtf8 {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for StringUtf8 {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&str> for StringUtf8 {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for StringUtf8 {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl AsRef<[u8]> for StringUtf8 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<str> for StringUtf8 {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for StringUtf8 {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<[u8]> for StringUtf8 {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl fmt::Display for StringUtf8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl fmt::Debug for StringUtf8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl Serialize for StringUtf8 {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_str_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_and_ordering_are_bytewise() {
        let a = StringUtf8::from("a/b");
        let b = StringUtf8::from("a/c");
        assert!(a < b);
        assert_eq!(a, "a/b");
        assert_eq!(a, StringUtf8::from(b"a/b".to_vec()));
    }

    #[test]
    fn test_non_utf8_bytes_preserved() {
        let raw = vec![b'f', 0xe9, b'.', b't', b'x', b't'];
        let s = StringUtf8::from(raw.clone());
        assert_eq!(s.as_bytes(), raw.as_slice());
        assert!(s.as_str().is_err());
        assert_eq!(s.to_str_lossy(), "f\u{fffd}.txt");
    }

    #[test]
    fn test_substring_and_split() {
        let s = StringUtf8::from("dir/sub/file.rs");
        assert_eq!(s.substring(4..7), "sub");
        let (head, tail) = s.split_once(b'/').unwrap();
        assert_eq!(head, "dir");
        assert_eq!(tail, "sub/file.rs");
        assert_eq!(s.rfind_byte(b'/'), Some(7));
    }

    #[test]
    fn test_char_aware_indexing() {
        let s = StringUtf8::from("añb€c");
        assert_eq!(s.char_count(), 5);
        assert_eq!(s.char_offset(2), 3);
        assert_eq!(s.substring_chars(1, 3), "ñb€");
        assert_eq!(s.substring_chars(4, 10), "c");
    }

    #[test]
    fn test_trim() {
        let s = StringUtf8::from("  text \n");
        assert_eq!(s.trim(), "text");
        assert_eq!(s.trim_start(), "text \n");
        assert_eq!(s.trim_end(), "  text");
        assert_eq!(StringUtf8::from("   ").trim(), "");
    }

    #[test]
    fn test_numeric_parsing() {
        assert_eq!(StringUtf8::from("1234").parse_u64(), Some(1234));
        assert_eq!(StringUtf8::from("-42").parse_i64(), Some(-42));
        assert_eq!(StringUtf8::from("+7").parse_i64(), Some(7));
        assert_eq!(StringUtf8::from("").parse_u64(), None);
        assert_eq!(StringUtf8::from("12a").parse_u64(), None);
        assert_eq!(StringUtf8::from("99999999999999999999999").parse_u64(), None);
    }
}
