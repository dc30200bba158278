//! Parse error types.

use plumbline_core::{ObjectId, ObjectType};
use std::fmt;
use thiserror::Error;

/// Number of raw bytes kept around the failure offset.
const WINDOW_LEN: usize = 48;

/// What went wrong while parsing.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// A specific token or delimiter was expected.
    #[error("expected {0}")]
    Expected(&'static str),

    /// The byte at the cursor cannot start a record.
    #[error("not a valid record start")]
    NoMatch,

    /// The stream ended inside a record.
    #[error("truncated record")]
    Truncated,

    /// A field is not a 40-character hex object id.
    #[error("invalid object id")]
    InvalidObjectId,

    /// A field is not an octal file mode.
    #[error("invalid file mode")]
    InvalidMode,

    /// A field is not a valid decimal number.
    #[error("invalid number")]
    InvalidNumber,

    /// A field names no known object type.
    #[error("unknown object type")]
    UnknownObjectType,

    /// An identity line is malformed.
    #[error("malformed identity")]
    InvalidIdentity,

    /// A C-quoted path is malformed.
    #[error("malformed quoted path")]
    InvalidQuoting,

    /// A status letter is not recognized.
    #[error("unknown status {0:?}")]
    UnknownStatus(char),

    /// A mandatory header is missing.
    #[error("missing {0} header")]
    MissingField(&'static str),

    /// A header that must appear once appeared again.
    #[error("duplicate {0} header")]
    DuplicateField(&'static str),

    /// Reading the source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a parse happened, attached as errors cross into callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    /// Operation that requested the parse.
    pub operation: &'static str,
    /// Object being parsed, if any.
    pub id: Option<ObjectId>,
    /// Object type that was requested, if any.
    pub object_type: Option<ObjectType>,
}

/// A structural parse failure.
///
/// Carries the byte offset of the failure relative to the start of the
/// stream and a window of the raw bytes found there.
#[derive(Debug)]
pub struct ParseError {
    kind: ParseErrorKind,
    offset: usize,
    window: Vec<u8>,
    context: Option<ParseContext>,
}

impl ParseError {
    /// Creates an error at `offset`, keeping a prefix of `window`.
    pub fn new(kind: ParseErrorKind, offset: usize, window: &[u8]) -> Self {
        Self {
            kind,
            offset,
            window: window[..window.len().min(WINDOW_LEN)].to_vec(),
            context: None,
        }
    }

    /// Creates an error pointing into `data` at `offset`.
    pub fn at(kind: ParseErrorKind, data: &[u8], offset: usize) -> Self {
        let start = offset.min(data.len());
        Self::new(kind, offset, &data[start..])
    }

    /// The failure kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Byte offset of the failure.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Raw bytes at the failure offset.
    pub fn window(&self) -> &[u8] {
        &self.window
    }

    /// Context attached by callers, if any.
    pub fn context(&self) -> Option<&ParseContext> {
        self.context.as_ref()
    }

    /// Attaches caller context, keeping the original kind and offset.
    pub fn with_context(
        mut self,
        operation: &'static str,
        id: Option<ObjectId>,
        object_type: Option<ObjectType>,
    ) -> Self {
        self.context = Some(ParseContext {
            operation,
            id,
            object_type,
        });
        self
    }

    /// Moves the offset forward by `base` bytes.
    pub(crate) fn shifted(mut self, base: usize) -> Self {
        self.offset += base;
        self
    }
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ParseErrorKind::Io(err), 0, &[])
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)?;
        if !self.window.is_empty() {
            write!(f, " near {:?}", String::from_utf8_lossy(&self.window))?;
        }
        if let Some(ctx) = &self.context {
            write!(f, " while {}", ctx.operation)?;
            if let Some(id) = &ctx.id {
                write!(f, " {}", id)?;
            }
            if let Some(ty) = ctx.object_type {
                write!(f, " as {}", ty)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// A specialized Result type for parse operations.
pub type Result<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_bounded() {
        let data = vec![b'x'; 500];
        let err = ParseError::at(ParseErrorKind::NoMatch, &data, 10);
        assert_eq!(err.offset(), 10);
        assert_eq!(err.window().len(), WINDOW_LEN);
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = ParseError::at(ParseErrorKind::MissingField("tree"), b"author x", 0)
            .with_context("read_object", Some(ObjectId::ZERO), Some(ObjectType::Commit));
        assert!(matches!(err.kind(), ParseErrorKind::MissingField("tree")));
        let ctx = err.context().unwrap();
        assert_eq!(ctx.operation, "read_object");
        assert_eq!(ctx.object_type, Some(ObjectType::Commit));

        let text = err.to_string();
        assert!(text.contains("missing tree header"));
        assert!(text.contains("read_object"));
        assert!(text.contains("as commit"));
    }

    #[test]
    fn test_offset_beyond_data() {
        let err = ParseError::at(ParseErrorKind::Truncated, b"abc", 10);
        assert_eq!(err.offset(), 10);
        assert!(err.window().is_empty());
    }
}
