//! Paging driver that feeds a [`Read`] source through a [`RecordParser`].

use crate::{ParseError, ParseErrorKind, ParseResult, RecordParser, Result};
use plumbline_core::READ_BUFFER_POOL;
use std::io::Read;
use tracing::trace;

/// Default number of bytes requested from the source per refill.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads records from a byte source in bounded chunks.
///
/// Bytes are paged into a pooled buffer; the consumed prefix is dropped
/// before each refill so memory stays proportional to the largest record.
pub struct RecordReader<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: Read> RecordReader<R> {
    /// Creates a reader with the default chunk size.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the number of bytes requested per refill.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Parses the source until it ends or the parser reports completion.
    pub fn read_to_end<P: RecordParser>(&mut self, parser: P) -> Result<P::Output> {
        self.read_records(parser, usize::MAX)
    }

    /// Parses until `max` records have been produced or the source ends.
    ///
    /// Once `max` records are parsed no further reads are issued, so this
    /// is safe on a pipe that stays open after the last response.
    pub fn read_records<P: RecordParser>(&mut self, mut parser: P, max: usize) -> Result<P::Output> {
        let mut buffer = READ_BUFFER_POOL.acquire();
        let mut base = 0usize;
        let mut at_eof = false;

        loop {
            let remaining = max.saturating_sub(parser.records_parsed());
            if remaining == 0 {
                return parser.finish();
            }

            if !at_eof {
                let read = buffer
                    .fill_from(&mut self.reader, self.chunk_size)
                    .map_err(|e| ParseError::from(e).shifted(base))?;
                at_eof = read == 0;
                trace!(base, read, buffered = buffer.len(), "refilled parse buffer");
            }

            let mut index = 0;
            let result = parser
                .parse(&buffer, &mut index, remaining, at_eof)
                .map_err(|e| e.shifted(base))?;

            match result {
                ParseResult::MatchComplete => return parser.finish(),
                ParseResult::NoMatch => {
                    return Err(ParseError::at(ParseErrorKind::NoMatch, buffer.as_slice(), index)
                        .shifted(base));
                }
                ParseResult::MatchMaybeComplete | ParseResult::MatchIncomplete if at_eof => {
                    if index >= buffer.len() {
                        return parser.finish();
                    }
                    return Err(
                        ParseError::at(ParseErrorKind::Truncated, buffer.as_slice(), index)
                            .shifted(base),
                    );
                }
                ParseResult::MatchMaybeComplete | ParseResult::MatchIncomplete => {}
            }

            buffer.consume(index);
            base += index;
        }
    }

    /// Returns a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the driver and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
