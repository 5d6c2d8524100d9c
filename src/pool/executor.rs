//! Task submission
//!
//! Every concurrent activity of a session (relay directions, UDP loops,
//! per-client return paths) is submitted through an [`Executor`] rather
//! than spawned ad hoc.

use futures::future::BoxFuture;

/// Fire-and-forget task scheduler
pub trait Executor: Send + Sync {
    /// Schedule `task` to run to completion
    fn submit(&self, task: BoxFuture<'static, ()>);
}

/// Executor that spawns onto the current tokio runtime
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}
