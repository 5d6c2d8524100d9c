//! Outbound dialing
//!
//! The CONNECT and ASSOCIATE handlers open destination connections through
//! a [`Dialer`], so tests and embedders can substitute their own.

use super::{ProxyStream, SocketOpts};
use crate::socks::Context;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

/// Transport protocol to dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Stream connection
    Tcp,
    /// Datagram connection
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// A dialed destination connection
pub enum Connection {
    /// Byte stream (TCP or anything stream-like)
    Stream(Box<dyn ProxyStream>),
    /// Connected datagram socket
    Datagram(UdpSocket),
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connection::Stream(stream) => f
                .debug_tuple("Stream")
                .field(&stream.local_addr().ok())
                .finish(),
            Connection::Datagram(socket) => f.debug_tuple("Datagram").field(socket).finish(),
        }
    }
}

/// Opens connections to destinations
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial `addr` (`host:port`) over `network`
    async fn dial(&self, ctx: &Context, network: Network, addr: &str) -> io::Result<Connection>;
}

/// Dialer that connects directly from this host
#[derive(Debug, Clone)]
pub struct DirectDialer {
    /// Socket options applied to TCP connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl DirectDialer {
    /// Create a direct dialer with default options
    pub fn with_defaults() -> Self {
        DirectDialer {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn dial_tcp(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "i/o timeout"))??;

        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options: {}", e);
        }

        debug!("TCP connection established to {}", addr);
        Ok(stream)
    }

    async fn dial_udp(&self, addr: &str) -> io::Result<UdpSocket> {
        let target = tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {}", addr))
        })?;

        let local = match target {
            SocketAddr::V4(_) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
            SocketAddr::V6(_) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;

        debug!("UDP socket {} connected to {}", socket.local_addr()?, target);
        Ok(socket)
    }
}

impl Default for DirectDialer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, _ctx: &Context, network: Network, addr: &str) -> io::Result<Connection> {
        match network {
            Network::Tcp => {
                let stream = self.dial_tcp(addr).await?;
                Ok(Connection::Stream(Box::new(stream)))
            }
            Network::Udp => Ok(Connection::Datagram(self.dial_udp(addr).await?)),
        }
    }
}
