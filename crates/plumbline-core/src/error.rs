//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a valid object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// The input names no known object type.
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    /// The input is not a valid octal file mode.
    #[error("invalid file mode: {0}")]
    InvalidMode(String),

    /// Bytes were required to be UTF-8 but are not.
    #[error("invalid UTF-8 at byte {valid_up_to}")]
    InvalidUtf8 {
        /// Length of the valid prefix.
        valid_up_to: usize,
    },
}

impl From<std::str::Utf8Error> for Error {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8 {
            valid_up_to: err.valid_up_to(),
        }
    }
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
