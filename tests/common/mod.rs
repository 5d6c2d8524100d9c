//! Test utilities and mocks for Socksrelay
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use socksrelay::pool::Executor;
use socksrelay::socks::{Context, SOCKS5_RESERVED, SOCKS5_VERSION};
use socksrelay::transport::{Connection, Dialer, Network, ProxyStream};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::{TcpListener, UdpSocket};

/// Local address reported by [`FakeStream`]
pub const FAKE_LOCAL_ADDR: &str = "127.0.0.1:55001";

/// In-memory target connection with a fixed local address
pub struct FakeStream {
    inner: DuplexStream,
    local: SocketAddr,
}

impl FakeStream {
    /// Wrap one end of a duplex pipe
    pub fn new(inner: DuplexStream) -> Self {
        FakeStream {
            inner,
            local: FAKE_LOCAL_ADDR.parse().unwrap(),
        }
    }
}

impl AsyncRead for FakeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl ProxyStream for FakeStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}

enum DialBehavior {
    /// Hand out this stream once
    Stream(Mutex<Option<DuplexStream>>),
    /// Bind a loopback UDP socket connected to this address
    Udp(SocketAddr),
    /// Fail every dial with this error
    Fail(io::ErrorKind, String),
}

/// Dialer stub that records every dial
pub struct StubDialer {
    behavior: DialBehavior,
    dials: AtomicUsize,
    dialed: Mutex<Vec<(Network, String)>>,
}

impl StubDialer {
    fn with_behavior(behavior: DialBehavior) -> Self {
        StubDialer {
            behavior,
            dials: AtomicUsize::new(0),
            dialed: Mutex::new(Vec::new()),
        }
    }

    /// Return `stream` (wrapped in a [`FakeStream`]) on the first TCP dial
    pub fn stream(stream: DuplexStream) -> Self {
        Self::with_behavior(DialBehavior::Stream(Mutex::new(Some(stream))))
    }

    /// Return UDP sockets connected to `target`
    pub fn udp(target: SocketAddr) -> Self {
        Self::with_behavior(DialBehavior::Udp(target))
    }

    /// Fail every dial with `kind` and `message`
    pub fn failing(kind: io::ErrorKind, message: &str) -> Self {
        Self::with_behavior(DialBehavior::Fail(kind, message.to_string()))
    }

    /// Number of dials attempted
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Network and address of every dial
    pub fn dialed(&self) -> Vec<(Network, String)> {
        self.dialed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for StubDialer {
    async fn dial(&self, _ctx: &Context, network: Network, addr: &str) -> io::Result<Connection> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.dialed.lock().unwrap().push((network, addr.to_string()));

        match &self.behavior {
            DialBehavior::Stream(stream) => {
                let stream = stream
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stream already taken"))?;
                Ok(Connection::Stream(Box::new(FakeStream::new(stream))))
            }
            DialBehavior::Udp(target) => {
                let socket = UdpSocket::bind("127.0.0.1:0").await?;
                socket.connect(target).await?;
                Ok(Connection::Datagram(socket))
            }
            DialBehavior::Fail(kind, message) => Err(io::Error::new(*kind, message.clone())),
        }
    }
}

/// Executor that counts submitted tasks before spawning them
#[derive(Default)]
pub struct CountingExecutor {
    submitted: AtomicUsize,
}

impl CountingExecutor {
    /// Number of tasks submitted so far
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl Executor for CountingExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(task);
    }
}

/// Encode a request header for `addr`
pub fn request_bytes(command: u8, addr: SocketAddr) -> Vec<u8> {
    let mut bytes = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED];
    bytes.extend_from_slice(&address_bytes(addr));
    bytes
}

/// Encode a UDP relay frame carrying `payload` for `addr`
pub fn udp_frame(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, 0x00];
    bytes.extend_from_slice(&address_bytes(addr));
    bytes.extend_from_slice(payload);
    bytes
}

/// ATYP + ADDR + PORT for a socket address
pub fn address_bytes(addr: SocketAddr) -> Vec<u8> {
    let mut bytes = Vec::new();
    match addr {
        SocketAddr::V4(v4) => {
            bytes.push(0x01);
            bytes.extend_from_slice(&v4.ip().octets());
        }
        SocketAddr::V6(v6) => {
            bytes.push(0x04);
            bytes.extend_from_slice(&v6.ip().octets());
        }
    }
    bytes.extend_from_slice(&addr.port().to_be_bytes());
    bytes
}

/// Spawn a UDP server answering each datagram with `reply:` + payload
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let mut reply = b"reply:".to_vec();
            reply.extend_from_slice(&buf[..n]);
            let _ = socket.send_to(&reply, peer).await;
        }
    });

    addr
}

/// Spawn a TCP server echoing everything it reads
pub async fn spawn_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
