//! Pooled read buffers.
//!
//! Every read from a child process pages its output through a
//! [`ByteBuffer`]. Buffers are acquired from a pool for the duration of one
//! parse pass and returned, cleared, when the guard drops.

use crate::ByteBuffer;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pool of reusable byte buffers.
pub struct BufferPool {
    /// Buffers ready for reuse.
    available: Mutex<Vec<ByteBuffer>>,
    /// Capacity of freshly created buffers.
    initial_capacity: usize,
    /// Buffers that grew past this are dropped instead of retained.
    max_retained_capacity: usize,
    /// Maximum number of idle buffers kept.
    max_size: usize,
    /// Number of buffers currently borrowed.
    borrowed: AtomicUsize,
    /// Total number of buffers created.
    created: AtomicUsize,
}

impl BufferPool {
    /// Creates a pool handing out buffers of `initial_capacity` bytes.
    pub fn new(initial_capacity: usize, max_retained_capacity: usize, max_size: usize) -> Self {
        Self {
            available: Mutex::new(Vec::with_capacity(max_size)),
            initial_capacity,
            max_retained_capacity: max_retained_capacity.max(initial_capacity),
            max_size,
            borrowed: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
        }
    }

    /// Acquires a cleared buffer from the pool.
    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self.available.lock().pop().unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            ByteBuffer::with_capacity(self.initial_capacity)
        });

        self.borrowed.fetch_add(1, Ordering::Relaxed);

        PooledBuffer {
            buffer: Some(buffer),
            pool: self,
        }
    }

    fn release(&self, mut buffer: ByteBuffer) {
        self.borrowed.fetch_sub(1, Ordering::Relaxed);

        if buffer.capacity() > self.max_retained_capacity {
            return;
        }
        buffer.clear();
        let mut available = self.available.lock();
        if available.len() < self.max_size {
            available.push(buffer);
        }
    }

    /// Returns the number of idle buffers.
    pub fn available(&self) -> usize {
        self.available.lock().len()
    }

    /// Returns the number of borrowed buffers.
    pub fn borrowed(&self) -> usize {
        self.borrowed.load(Ordering::Relaxed)
    }

    /// Returns the total number of buffers created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

/// A buffer that returns to its pool on drop.
pub struct PooledBuffer<'a> {
    buffer: Option<ByteBuffer>,
    pool: &'a BufferPool,
}

impl Deref for PooledBuffer<'_> {
    type Target = ByteBuffer;

    fn deref(&self) -> &ByteBuffer {
        self.buffer.as_ref().expect("buffer present until drop")
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut ByteBuffer {
        self.buffer.as_mut().expect("buffer present until drop")
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.release(buffer);
        }
    }
}

/// Global pool for process-output read buffers.
pub static READ_BUFFER_POOL: std::sync::LazyLock<BufferPool> = std::sync::LazyLock::new(|| {
    BufferPool::new(
        64 * 1024,       // 64 KB buffers
        4 * 1024 * 1024, // drop buffers that grew past 4 MB
        32,
    )
});
