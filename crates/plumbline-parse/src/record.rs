//! The resumable record-parser contract.

use crate::{ParseError, ParseErrorKind, Result};
use plumbline_core::{ByteBuffer, FileMode, ObjectId};

/// Outcome of one [`RecordParser::parse`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseResult {
    /// The requested number of records was parsed, or the stream ended.
    MatchComplete,
    /// At least one record was parsed and the buffer ended exactly on a
    /// record boundary. Refill and call again before deciding.
    MatchMaybeComplete,
    /// No full record is available at the cursor. Append bytes and call
    /// again; records before the cursor are committed.
    MatchIncomplete,
    /// The byte at the cursor cannot start a record.
    NoMatch,
}

/// A stateful parser over a byte stream that can resume across refills.
///
/// `parse` reads records from `buffer` starting at `*index`, advances
/// `*index` past every byte it consumed, and stops after `max` records.
/// `at_eof` signals that no more bytes will follow, so a legally
/// unterminated final record may be accepted. Parsed records accumulate
/// inside the parser; [`finish`](RecordParser::finish) hands them over.
pub trait RecordParser {
    /// The value produced once the stream is fully parsed.
    type Output;

    /// Parses as many records as are available, up to `max`.
    fn parse(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        max: usize,
        at_eof: bool,
    ) -> Result<ParseResult>;

    /// Number of records parsed so far.
    fn records_parsed(&self) -> usize;

    /// Validates the accumulated state and returns the parsed value.
    fn finish(self) -> Result<Self::Output>;

    /// Parses a complete in-memory payload.
    fn parse_complete(mut self, data: &[u8]) -> Result<Self::Output>
    where
        Self: Sized,
    {
        let buffer = ByteBuffer::from(data);
        let mut index = 0;
        match self.parse(&buffer, &mut index, usize::MAX, true)? {
            ParseResult::NoMatch => Err(ParseError::at(ParseErrorKind::NoMatch, data, index)),
            ParseResult::MatchIncomplete if index < data.len() => {
                Err(ParseError::at(ParseErrorKind::Truncated, data, index))
            }
            _ => self.finish(),
        }
    }
}

/// What a single record attempt produced.
pub(crate) enum Step {
    /// A record ended at the given offset.
    Record(usize),
    /// Non-record bytes (a header line) ended at the given offset.
    Skip(usize),
    /// A stream terminator ended at the given offset.
    Terminator(usize),
    /// More bytes are needed.
    Incomplete,
    /// The cursor is not at a record start.
    NoMatch,
}

/// Drives a per-record closure over the buffer and maps the outcome onto
/// [`ParseResult`].
pub(crate) fn scan_records<F>(
    buffer: &ByteBuffer,
    index: &mut usize,
    max: usize,
    at_eof: bool,
    mut record: F,
) -> Result<ParseResult>
where
    F: FnMut(&ByteBuffer, usize, bool) -> Result<Step>,
{
    let mut parsed = 0usize;
    loop {
        if parsed >= max {
            return Ok(ParseResult::MatchComplete);
        }
        if *index >= buffer.len() {
            return Ok(if at_eof {
                ParseResult::MatchComplete
            } else if parsed > 0 {
                ParseResult::MatchMaybeComplete
            } else {
                ParseResult::MatchIncomplete
            });
        }
        match record(buffer, *index, at_eof)? {
            Step::Record(next) => {
                *index = next;
                parsed += 1;
            }
            Step::Skip(next) => *index = next,
            Step::Terminator(next) => {
                *index = next;
                return Ok(ParseResult::MatchComplete);
            }
            Step::Incomplete => return Ok(ParseResult::MatchIncomplete),
            Step::NoMatch => return Ok(ParseResult::NoMatch),
        }
    }
}

/// Finds `byte` at or after `from`; `None` means the record is incomplete.
pub(crate) fn find(buffer: &ByteBuffer, byte: u8, from: usize) -> Option<usize> {
    buffer.find_byte(byte, from..buffer.len())
}

/// Finds the end of a line starting at `from`.
///
/// Returns the line end and the offset after its terminator. At end of
/// stream an unterminated line runs to the end of the buffer.
pub(crate) fn line_end(
    buffer: &ByteBuffer,
    terminator: u8,
    from: usize,
    at_eof: bool,
) -> Option<(usize, usize)> {
    match find(buffer, terminator, from) {
        Some(end) => Some((end, end + 1)),
        None if at_eof && from < buffer.len() => Some((buffer.len(), buffer.len())),
        None => None,
    }
}

pub(crate) fn parse_id(field: &[u8], offset: usize) -> Result<ObjectId> {
    ObjectId::from_hex_bytes(field)
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidObjectId, offset, field))
}

pub(crate) fn parse_mode(field: &[u8], offset: usize) -> Result<FileMode> {
    FileMode::parse_octal(field)
        .map_err(|_| ParseError::new(ParseErrorKind::InvalidMode, offset, field))
}

pub(crate) fn parse_u64(field: &[u8], offset: usize) -> Result<u64> {
    let invalid = || ParseError::new(ParseErrorKind::InvalidNumber, offset, field);
    if field.is_empty() {
        return Err(invalid());
    }
    field.iter().try_fold(0u64, |acc, &b| {
        if !b.is_ascii_digit() {
            return Err(invalid());
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(invalid)
    })
}

/// Splits `data` into at most `n` fields on `sep`; the last field keeps
/// any remaining separators.
pub(crate) fn split_fields(data: &[u8], sep: u8, n: usize) -> smallvec::SmallVec<[(usize, &[u8]); 12]> {
    let mut fields = smallvec::SmallVec::new();
    let mut start = 0;
    while fields.len() + 1 < n {
        match memchr::memchr(sep, &data[start..]) {
            Some(pos) => {
                fields.push((start, &data[start..start + pos]));
                start += pos + 1;
            }
            None => break,
        }
    }
    fields.push((start, &data[start..]));
    fields
}
