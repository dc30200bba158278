//! `git cat-file --batch` and `--batch-check` response parser.

use crate::record::{find, parse_id, parse_u64, scan_records, Step};
use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use bytes::Bytes;
use plumbline_core::{ByteBuffer, ObjectHeader, ObjectType, StringUtf8};

/// The header line of one batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchHeader {
    /// `<id> <type> <size>`.
    Found(ObjectHeader),
    /// `<name> missing`.
    Missing(StringUtf8),
    /// `<name> ambiguous`.
    Ambiguous(StringUtf8),
}

impl BatchHeader {
    /// Parses one header line without its trailing newline.
    ///
    /// `offset` is the stream offset of `line`, used for error reporting.
    pub fn parse(line: &[u8], offset: usize) -> Result<Self> {
        if let Some(name) = line.strip_suffix(b" missing") {
            return Ok(Self::Missing(StringUtf8::from(name)));
        }
        if let Some(name) = line.strip_suffix(b" ambiguous") {
            return Ok(Self::Ambiguous(StringUtf8::from(name)));
        }

        let mut fields = line.splitn(3, |&b| b == b' ');
        let (Some(id), Some(ty), Some(size)) = (fields.next(), fields.next(), fields.next()) else {
            return Err(ParseError::new(
                ParseErrorKind::Expected("<id> <type> <size>"),
                offset,
                line,
            ));
        };
        let type_offset = offset + id.len() + 1;
        let id = parse_id(id, offset)?;
        let object_type = ObjectType::parse_bytes(ty)
            .map_err(|_| ParseError::new(ParseErrorKind::UnknownObjectType, type_offset, ty))?;
        let size = parse_u64(size, type_offset + ty.len() + 1)?;
        Ok(Self::Found(ObjectHeader::new(id, object_type, size)))
    }
}

/// One complete batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchResponse {
    /// The object exists. `content` is present for `--batch` responses.
    Found {
        /// Identity, type and size.
        header: ObjectHeader,
        /// The payload, without the trailing newline.
        content: Option<Bytes>,
    },
    /// No object matched the request.
    Missing(StringUtf8),
    /// The request matched more than one object.
    Ambiguous(StringUtf8),
}

/// Whether responses carry payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// `--batch`: header, payload and a newline.
    Contents,
    /// `--batch-check`: header only.
    Check,
}

/// Parses a sequence of batch responses.
pub struct BatchParser {
    mode: BatchMode,
    responses: Vec<BatchResponse>,
}

impl BatchParser {
    /// Creates a parser for `mode`.
    pub fn new(mode: BatchMode) -> Self {
        Self {
            mode,
            responses: Vec::new(),
        }
    }

    fn record(&mut self, buffer: &ByteBuffer, at: usize) -> Result<Step> {
        let Some(end) = find(buffer, b'\n', at) else {
            return Ok(Step::Incomplete);
        };
        let response = match BatchHeader::parse(&buffer[at..end], at)? {
            BatchHeader::Missing(name) => BatchResponse::Missing(name),
            BatchHeader::Ambiguous(name) => BatchResponse::Ambiguous(name),
            BatchHeader::Found(header) if self.mode == BatchMode::Check => BatchResponse::Found {
                header,
                content: None,
            },
            BatchHeader::Found(header) => {
                let start = end + 1;
                let payload_end = usize::try_from(header.size)
                    .ok()
                    .and_then(|size| start.checked_add(size))
                    .ok_or_else(|| {
                        ParseError::at(ParseErrorKind::InvalidNumber, buffer.as_slice(), at)
                    })?;
                if payload_end >= buffer.len() {
                    return Ok(Step::Incomplete);
                }
                if buffer[payload_end] != b'\n' {
                    return Err(ParseError::at(
                        ParseErrorKind::Expected("newline after payload"),
                        buffer.as_slice(),
                        payload_end,
                    ));
                }
                self.responses.push(BatchResponse::Found {
                    header,
                    content: Some(Bytes::copy_from_slice(&buffer[start..payload_end])),
                });
                return Ok(Step::Record(payload_end + 1));
            }
        };
        self.responses.push(response);
        Ok(Step::Record(end + 1))
    }
}

impl RecordParser for BatchParser {
    type Output = Vec<BatchResponse>;

    fn parse(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        max: usize,
        at_eof: bool,
    ) -> Result<ParseResult> {
        scan_records(buffer, index, max, at_eof, |buf, at, _| self.record(buf, at))
    }

    fn records_parsed(&self) -> usize {
        self.responses.len()
    }

    fn finish(self) -> Result<Vec<BatchResponse>> {
        Ok(self.responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plumbline_core::ObjectId;
    use pretty_assertions::assert_eq;

    const ID: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";

    #[test]
    fn test_parse_header() {
        let line = format!("{ID} blob 12");
        assert_eq!(
            BatchHeader::parse(line.as_bytes(), 0).unwrap(),
            BatchHeader::Found(ObjectHeader::new(
                ObjectId::from_hex(ID).unwrap(),
                ObjectType::Blob,
                12
            ))
        );
        assert_eq!(
            BatchHeader::parse(b"HEAD:no such file missing", 0).unwrap(),
            BatchHeader::Missing(StringUtf8::from("HEAD:no such file"))
        );
        assert_eq!(
            BatchHeader::parse(b"abc1 ambiguous", 0).unwrap(),
            BatchHeader::Ambiguous(StringUtf8::from("abc1"))
        );
    }

    #[test]
    fn test_bad_size_offset() {
        let line = format!("{ID} blob 1x");
        let err = BatchHeader::parse(line.as_bytes(), 100).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::InvalidNumber));
        assert_eq!(err.offset(), 146);
    }

    #[test]
    fn test_contents_responses() {
        let data = format!("{ID} blob 11\nhello\nworld\nmissingname missing\n{ID} blob 0\n\n");
        let responses = BatchParser::new(BatchMode::Contents)
            .parse_complete(data.as_bytes())
            .unwrap();
        assert_eq!(responses.len(), 3);
        match &responses[0] {
            BatchResponse::Found { header, content } => {
                assert_eq!(header.size, 11);
                assert_eq!(content.as_deref(), Some(&b"hello\nworld"[..]));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            responses[1],
            BatchResponse::Missing(StringUtf8::from("missingname"))
        );
        match &responses[2] {
            BatchResponse::Found { content, .. } => assert_eq!(content.as_deref(), Some(&b""[..])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_payload_incomplete_until_trailing_newline() {
        let data = format!("{ID} blob 5\nhello");
        let mut parser = BatchParser::new(BatchMode::Contents);
        let buffer = ByteBuffer::from(data.as_bytes());
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, 1, false).unwrap(),
            ParseResult::MatchIncomplete
        );
        assert_eq!(index, 0);
    }

    #[test]
    fn test_check_mode_stops_at_max() {
        let data = format!("{ID} tree 100\n{ID} commit 250\n");
        let mut parser = BatchParser::new(BatchMode::Check);
        let buffer = ByteBuffer::from(data.as_bytes());
        let mut index = 0;
        assert_eq!(
            parser.parse(&buffer, &mut index, 2, false).unwrap(),
            ParseResult::MatchComplete
        );
        let responses = parser.finish().unwrap();
        assert_eq!(responses.len(), 2);
    }
}
