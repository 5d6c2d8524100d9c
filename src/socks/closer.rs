//! Idempotent close signal shared by the tasks of one session
//!
//! Closing is a one-way transition observed by every clone. Blocking
//! operations that race against [`Closer::closed`] fail once the session
//! is torn down, which is how relay tasks learn they must exit.

use std::io;
use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable handle to a session's close state
#[derive(Debug, Clone)]
pub struct Closer {
    tx: Arc<watch::Sender<bool>>,
}

impl Closer {
    /// Create an open closer
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Closer { tx: Arc::new(tx) }
    }

    /// Close; returns `true` only for the call that performed the transition
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Whether the closer has been closed
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the closer is closed
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Guard that closes this closer when dropped
    pub fn guard(&self) -> CloseGuard {
        CloseGuard(self.clone())
    }
}

impl Default for Closer {
    fn default() -> Self {
        Self::new()
    }
}

/// Closes its [`Closer`] on drop, on every exit path
#[derive(Debug)]
pub struct CloseGuard(Closer);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Error reported by operations on a closed socket
pub fn closed_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "use of closed network connection",
    )
}
