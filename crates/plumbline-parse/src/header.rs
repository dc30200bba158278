//! Shared header-block walker for commit and tag payloads.
//!
//! Both formats are `key value` lines, optionally followed by
//! space-prefixed continuation lines, then a blank line and a free-form
//! message running to the end of the payload.

use crate::record::line_end;
use crate::{ParseResult, Result};
use plumbline_core::ByteBuffer;

/// One `key value` header line.
pub(crate) struct Header<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    /// Stream offset of `value`.
    pub value_offset: usize,
}

#[derive(Default)]
pub(crate) struct HeaderBlock {
    in_message: bool,
    complete: bool,
    message: Vec<u8>,
}

impl HeaderBlock {
    /// Walks header lines, handing known ones to `on_header`.
    ///
    /// Continuation lines are dropped along with the header they extend.
    pub fn parse<F>(
        &mut self,
        buffer: &ByteBuffer,
        index: &mut usize,
        at_eof: bool,
        mut on_header: F,
    ) -> Result<ParseResult>
    where
        F: FnMut(Header<'_>) -> Result<()>,
    {
        if self.complete {
            return Ok(ParseResult::MatchComplete);
        }

        while !self.in_message {
            let Some((end, next)) = line_end(buffer, b'\n', *index, at_eof) else {
                if at_eof {
                    // Header block ran to the end of the payload with no message.
                    self.complete = true;
                    return Ok(ParseResult::MatchComplete);
                }
                return Ok(ParseResult::MatchIncomplete);
            };

            let line = &buffer[*index..end];
            if line.is_empty() {
                self.in_message = true;
            } else if line[0] != b' ' {
                let (key, value, value_start) = match memchr::memchr(b' ', line) {
                    Some(sp) => (&line[..sp], &line[sp + 1..], sp + 1),
                    None => (line, &line[line.len()..], line.len()),
                };
                on_header(Header {
                    key,
                    value,
                    value_offset: *index + value_start,
                })?;
            }
            *index = next;
        }

        self.message.extend_from_slice(&buffer[*index..buffer.len()]);
        *index = buffer.len();
        if at_eof {
            self.complete = true;
            Ok(ParseResult::MatchComplete)
        } else {
            Ok(ParseResult::MatchIncomplete)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn take_message(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.message)
    }
}

/// The message up to its first newline.
pub(crate) fn first_line(message: &[u8]) -> &[u8] {
    let end = memchr::memchr(b'\n', message).unwrap_or(message.len());
    &message[..end]
}
