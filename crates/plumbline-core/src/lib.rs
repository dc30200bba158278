//! # Plumbline Core
//!
//! Leaf types shared by every plumbline crate: the 20-byte [`ObjectId`],
//! object headers and file modes, the growable [`ByteBuffer`] used as the
//! parsing substrate, the [`StringUtf8`] byte-faithful string view, and a
//! pool for recycling read buffers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod error;
mod mode;
mod object;
pub mod pool;
mod utf8;

pub use buffer::ByteBuffer;
pub use error::{Error, Result};
pub use mode::FileMode;
pub use object::{ObjectHeader, ObjectId, ObjectType};
pub use pool::{BufferPool, PooledBuffer, READ_BUFFER_POOL};
pub use utf8::StringUtf8;
