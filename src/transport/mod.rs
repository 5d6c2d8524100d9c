//! Transport module for Socksrelay
//!
//! This module provides the stream abstractions used by the relay and the
//! dialer that opens connections to destinations.

mod dialer;

pub use dialer::{Connection, Dialer, DirectDialer, Network};

use crate::config::TcpConfig;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Boxed read half of a client connection
pub type BoxReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Boxed write half of a client connection
pub type BoxWriter = Box<dyn AsyncWrite + Send + Sync + Unpin>;

/// A connected byte stream that knows its local address
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {
    /// Local address of the connection, reported to clients as BND.ADDR
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl ProxyStream for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }
}

/// Socket options for configuring connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}
