//! SOCKS5 request parser
//!
//! Turns the bytes following authentication into a [`Request`].

use crate::error::Socks5Error;
use crate::socks::context::AuthContext;
use crate::socks::types::{AddrSpec, Command, Header};
use crate::transport::BoxReader;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::AsyncRead;

/// A request received by the server
pub struct Request {
    /// Parsed protocol header
    pub header: Header,
    /// Result of the authentication step
    pub auth_context: Option<AuthContext>,
    /// Address the server accepted the connection on
    pub local_addr: Option<SocketAddr>,
    /// Address of the client
    pub remote_addr: Option<SocketAddr>,
    /// Destination exactly as the client sent it
    pub raw_dest_addr: AddrSpec,
    /// Destination that will be dialed (resolved, possibly rewritten)
    pub dest_addr: AddrSpec,
    /// Client stream positioned right after the request header
    pub reader: BoxReader,
}

impl Request {
    /// Parse a request from the client stream
    ///
    /// # SOCKS5 Request Format
    ///
    /// ```text
    /// +----+-----+-------+------+----------+----------+
    /// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    /// +----+-----+-------+------+----------+----------+
    /// | 1  |  1  | X'00' |  1   | Variable |    2     |
    /// +----+-----+-------+------+----------+----------+
    /// ```
    ///
    /// The returned request keeps the stream, so bytes that follow the
    /// header remain readable by the command handler.
    pub async fn parse<R>(reader: R) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        let mut reader: BoxReader = Box::new(reader);
        let header = Header::parse(&mut reader).await?;

        if Command::from_byte(header.command).is_none() {
            return Err(Socks5Error::UnsupportedCommand(header.command));
        }

        tracing::debug!(
            "Parsed SOCKS5 request: cmd={} dest={}",
            header.command,
            header.address
        );

        let raw_dest_addr = header.address.clone();
        Ok(Request {
            dest_addr: raw_dest_addr.clone(),
            raw_dest_addr,
            header,
            auth_context: None,
            local_addr: None,
            remote_addr: None,
            reader,
        })
    }

    /// The requested command, if it is one the server knows
    pub fn command(&self) -> Option<Command> {
        Command::from_byte(self.header.command)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("header", &self.header)
            .field("auth_context", &self.auth_context)
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("raw_dest_addr", &self.raw_dest_addr)
            .field("dest_addr", &self.dest_addr)
            .finish_non_exhaustive()
    }
}
