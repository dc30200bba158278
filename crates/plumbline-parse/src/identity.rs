//! Author, committer and tagger lines.

use crate::{ParseError, ParseErrorKind, Result};
use chrono::{DateTime, FixedOffset};
use plumbline_core::StringUtf8;

/// A name, email and timestamp, as in `author` or `tagger` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Display name, trimmed.
    pub name: StringUtf8,
    /// Email address without the angle brackets.
    pub email: StringUtf8,
    /// When the action happened, in the recorded timezone.
    pub when: DateTime<FixedOffset>,
}

impl Identity {
    /// Parses `name <email> seconds tz`.
    ///
    /// `offset` is the stream offset of `line`, used for error reporting.
    pub fn parse(line: &[u8], offset: usize) -> Result<Self> {
        let invalid = |at: usize| ParseError::at(ParseErrorKind::InvalidIdentity, line, at).shifted(offset);

        let lt = memchr::memchr(b'<', line).ok_or_else(|| invalid(0))?;
        let gt = memchr::memchr(b'>', &line[lt..])
            .map(|i| lt + i)
            .ok_or_else(|| invalid(lt))?;

        let name = StringUtf8::from(&line[..lt]).trim();
        let email = StringUtf8::from(&line[lt + 1..gt]);

        let rest = &line[gt + 1..];
        let rest_start = gt + 1;
        let (seconds, tz) = split_timezone(rest);

        let seconds = parse_seconds(trim(seconds)).ok_or_else(|| invalid(rest_start))?;
        let tz_offset = match tz {
            Some(tz) => parse_tz(tz).ok_or_else(|| invalid(rest_start))?,
            None => 0,
        };

        let zone = FixedOffset::east_opt(tz_offset).ok_or_else(|| invalid(rest_start))?;
        let when = DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| invalid(rest_start))?
            .with_timezone(&zone);

        Ok(Self { name, email, when })
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.when.timestamp()
    }

    /// Timezone offset east of UTC, in seconds.
    pub fn tz_offset_seconds(&self) -> i32 {
        self.when.offset().local_minus_utc()
    }
}

/// Scans backward for the `+`/`-` timezone marker following a space.
fn split_timezone(rest: &[u8]) -> (&[u8], Option<&[u8]>) {
    let marker = rest
        .iter()
        .rposition(|&b| b == b'+' || b == b'-')
        .filter(|&pos| pos > 0 && rest[pos - 1] == b' ');
    match marker {
        Some(pos) => (&rest[..pos], Some(trim(&rest[pos..]))),
        None => {
            // No marker: take the first token as seconds and ignore the rest.
            let rest = trim(rest);
            let end = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
            (&rest[..end], None)
        }
    }
}

fn parse_seconds(field: &[u8]) -> Option<i64> {
    let (negative, digits) = match field.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, field),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = digits
        .iter()
        .try_fold(0i64, |acc, &b| acc.checked_mul(10)?.checked_add(i64::from(b - b'0')))?;
    Some(if negative { -value } else { value })
}

/// Parses `+hhmm` / `-hhmm` into seconds east of UTC.
fn parse_tz(tz: &[u8]) -> Option<i32> {
    let (sign, digits) = match tz.split_first()? {
        (b'+', rest) => (1, rest),
        (b'-', rest) => (-1, rest),
        _ => return None,
    };
    if digits.len() != 4 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let num = |range: std::ops::Range<usize>| {
        digits[range]
            .iter()
            .fold(0i32, |acc, &b| acc * 10 + i32::from(b - b'0'))
    };
    Some(sign * (num(0..2) * 3600 + num(2..4) * 60))
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
