//! Error types for object database operations.

use plumbline_core::{ObjectId, ObjectType};
use plumbline_parse::ParseError;
use plumbline_process::ProcessError;
use thiserror::Error;

/// Errors that can occur reading objects or running repository commands.
#[derive(Error, Debug)]
pub enum OdbError {
    /// Output of a git process could not be decoded.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Spawning or running a git process failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Object not found
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The object name matched more than one object.
    #[error("ambiguous object name: {0}")]
    Ambiguous(String),

    /// The object exists but has a different type.
    #[error("object {id} is a {actual}, expected {expected}")]
    TypeMismatch {
        /// Object that was read.
        id: ObjectId,
        /// Requested type.
        expected: ObjectType,
        /// Type reported by git.
        actual: ObjectType,
    },

    /// The batch process closed its output mid-conversation.
    #[error("batch process closed unexpectedly")]
    ChannelClosed,

    /// The command was canceled.
    #[error("operation canceled")]
    Canceled,

    /// The database has been disposed.
    #[error("object database disposed")]
    Disposed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OdbError {
    /// The underlying parse error, if this is one.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for object database operations.
pub type Result<T> = std::result::Result<T, OdbError>;
