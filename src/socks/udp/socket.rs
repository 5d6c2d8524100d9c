//! Closable UDP socket shared by the tasks of one association

use crate::socks::closer::{closed_error, CloseGuard, Closer};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// UDP socket whose pending and future operations fail once closed
///
/// Any task may close it, any number of times. Operations blocked in a
/// receive or send return "use of closed network connection" as soon as
/// the socket is closed.
#[derive(Debug)]
pub struct RelaySocket {
    socket: UdpSocket,
    closer: Closer,
}

impl RelaySocket {
    /// Wrap an open socket
    pub fn new(socket: UdpSocket) -> Self {
        RelaySocket {
            socket,
            closer: Closer::new(),
        }
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Remote address of a connected socket
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Receive one datagram and its sender
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.guarded(self.socket.recv_from(buf)).await
    }

    /// Send one datagram to the connected peer
    pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        self.guarded(self.socket.send(buf)).await
    }

    /// Send one datagram to `target`
    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.guarded(self.socket.send_to(buf, target)).await
    }

    /// Close the socket; `true` only for the call that closed it
    pub fn close(&self) -> bool {
        self.closer.close()
    }

    /// Whether the socket has been closed
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Guard closing the socket when dropped
    pub fn close_guard(&self) -> CloseGuard {
        self.closer.guard()
    }

    async fn guarded<T, F>(&self, op: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        if self.closer.is_closed() {
            return Err(closed_error());
        }

        tokio::select! {
            biased;
            _ = self.closer.closed() => Err(closed_error()),
            result = op => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn loopback() -> RelaySocket {
        RelaySocket::new(UdpSocket::bind("127.0.0.1:0").await.unwrap())
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let a = loopback().await;
        let b = loopback().await;

        a.send_to(b"ping", b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let socket = Arc::new(loopback().await);
        let reader = socket.clone();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            reader.recv_from(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        socket.close();

        let err = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("use of closed network connection"));
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let socket = loopback().await;
        let target = socket.local_addr().unwrap();
        socket.close();

        assert!(socket.send_to(b"x", target).await.is_err());
        let mut buf = [0u8; 4];
        assert!(socket.recv_from(&mut buf).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_close_is_idempotent_across_tasks() {
        let socket = Arc::new(loopback().await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let socket = socket.clone();
                tokio::spawn(async move { socket.close() })
            })
            .collect();

        let mut first = 0;
        for handle in handles {
            if handle.await.unwrap() {
                first += 1;
            }
        }

        assert_eq!(first, 1);
        assert!(socket.is_closed());
    }

    #[tokio::test]
    async fn test_close_guard() {
        let socket = loopback().await;
        {
            let _guard = socket.close_guard();
        }
        assert!(socket.is_closed());
    }
}
