//! Buffer and task pools for Socksrelay
//!
//! Relay loops borrow their buffers from a shared [`BufferPool`] and run
//! as tasks submitted to an [`Executor`]. Both are injected into the
//! server so tests can observe buffer reuse and task spawning.

mod executor;
mod guard;

pub use executor::{Executor, TokioExecutor};
pub use guard::PooledBuffer;

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide pool of reusable byte buffers
///
/// Idle buffers sit in a lock-free queue shared by every relay task. A
/// buffer returned while the queue is full is dropped.
#[derive(Debug)]
pub struct BufferPool {
    /// Idle buffers ready to be handed out
    idle: ArrayQueue<Vec<u8>>,
    /// Length of every buffer handed out
    buffer_size: usize,
    /// Buffers currently handed out
    in_use: AtomicUsize,
}

impl BufferPool {
    /// Create a pool of `buffer_size` byte buffers retaining up to `max_idle`
    ///
    /// At least one idle buffer is always retained.
    pub fn new(buffer_size: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(BufferPool {
            idle: ArrayQueue::new(max_idle.max(1)),
            buffer_size,
            in_use: AtomicUsize::new(0),
        })
    }

    /// Borrow a buffer; it returns to the pool when the guard drops
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .idle
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size]);
        self.in_use.fetch_add(1, Ordering::Relaxed);
        PooledBuffer::new(buf, Arc::clone(self))
    }

    /// Number of idle buffers currently held
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    /// Number of buffers borrowed and not yet returned
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Length of the buffers handed out
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn put(&self, mut buf: Vec<u8>) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        buf.resize(self.buffer_size, 0);
        // Queue full: the buffer is dropped
        let _ = self.idle.push(buf);
    }
}
