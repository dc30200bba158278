//! Growable byte buffer used as the parsing substrate.
//!
//! Process output is paged into a [`ByteBuffer`] in bounded chunks. Parsers
//! read it through indexed access and bounded searches, and the reader drops
//! the consumed prefix with [`ByteBuffer::consume`] before the next refill.

use crate::{Result, StringUtf8};
use std::io::{self, Read};
use std::ops::{Index, Range};

const MIN_CAPACITY: usize = 64;

/// An owned, growable byte array with a logical length.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Returns the byte at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Empties the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Appends bytes, doubling the capacity as needed.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.ensure_spare(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Reads at most `max` bytes from `reader` onto the end of the buffer.
    ///
    /// Returns the number of bytes appended; zero means end of stream.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R, max: usize) -> io::Result<usize> {
        let max = max.max(1);
        self.ensure_spare(max);
        let start = self.data.len();
        self.data.resize(start + max, 0);
        loop {
            match reader.read(&mut self.data[start..]) {
                Ok(n) => {
                    self.data.truncate(start + n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.data.truncate(start);
                    return Err(e);
                }
            }
        }
    }

    /// Drops the first `count` bytes, shifting the rest to the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.data.len());
        if count == 0 {
            return;
        }
        self.data.copy_within(count.., 0);
        self.data.truncate(self.data.len() - count);
    }

    /// Finds the first `byte` within `range`.
    pub fn find_byte(&self, byte: u8, range: Range<usize>) -> Option<usize> {
        let range = self.clamp(range);
        memchr::memchr(byte, &self.data[range.clone()]).map(|i| range.start + i)
    }

    /// Finds the last `byte` within `range`.
    pub fn rfind_byte(&self, byte: u8, range: Range<usize>) -> Option<usize> {
        let range = self.clamp(range);
        memchr::memrchr(byte, &self.data[range.clone()]).map(|i| range.start + i)
    }

    /// Finds the first occurrence of `pattern` at or after `from`.
    pub fn find_slice(&self, pattern: &[u8], from: usize) -> Option<usize> {
        if from > self.data.len() {
            return None;
        }
        memchr::memmem::find(&self.data[from..], pattern).map(|i| from + i)
    }

    /// Returns true if the bytes at `index` start with `literal`.
    pub fn starts_with_at(&self, index: usize, literal: &[u8]) -> bool {
        self.data
            .get(index..)
            .is_some_and(|tail| tail.starts_with(literal))
    }

    /// Borrows `range` as a `str`, failing on invalid UTF-8.
    pub fn as_str(&self, range: Range<usize>) -> Result<&str> {
        Ok(std::str::from_utf8(&self.data[self.clamp(range)])?)
    }

    /// Copies `range` into an owned [`StringUtf8`].
    pub fn to_utf8(&self, range: Range<usize>) -> StringUtf8 {
        StringUtf8::from(&self.data[self.clamp(range)])
    }

    /// Consumes the buffer, returning its storage.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    fn clamp(&self, range: Range<usize>) -> Range<usize> {
        let end = range.end.min(self.data.len());
        range.start.min(end)..end
    }

    fn ensure_spare(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let mut target = self.data.capacity().max(MIN_CAPACITY);
        while target < needed {
            target *= 2;
        }
        self.data.reserve_exact(target - self.data.len());
    }
}

impl Index<usize> for ByteBuffer {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        &self.data[index]
    }
}

impl Index<Range<usize>> for ByteBuffer {
    type Output = [u8];

    fn index(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .finish()
    }
}
