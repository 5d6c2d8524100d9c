//! RAII guard for pooled buffers
//!
//! Provides automatic return of buffers to the pool when dropped.

use super::BufferPool;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// RAII guard that returns the buffer to the pool on drop
///
/// The buffer dereferences to a `Vec<u8>` that is `buffer_size` bytes
/// long when handed out. Callers may shrink or grow it; the pool restores
/// the length when the buffer comes back.
pub struct PooledBuffer {
    /// The buffer (Option to allow taking)
    buf: Option<Vec<u8>>,
    /// Pool to return the buffer to
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub(super) fn new(buf: Vec<u8>, pool: Arc<BufferPool>) -> Self {
        PooledBuffer {
            buf: Some(buf),
            pool,
        }
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the buffer
        self.buf.as_ref().expect("Buffer already returned")
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_mut().expect("Buffer already returned")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
