//! UDP relay frame encoding/decoding for SOCKS5
//!
//! Handles the encapsulation format for UDP datagrams in SOCKS5.

use crate::error::Socks5Error;
use crate::socks::consts::UDP_FRAME_PREFIX_LEN;
use crate::socks::types::AddrSpec;
use bytes::{Buf, BufMut};

/// Borrowed view of a UDP relay frame
///
/// # UDP Request/Response Format
///
/// ```text
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UdpFrame<'a> {
    /// Fragment number (0 for standalone datagrams)
    pub frag: u8,
    /// Destination (client to server) or source (server to client) address
    pub addr: AddrSpec,
    /// Datagram payload, borrowed from the receive buffer
    pub data: &'a [u8],
}

impl UdpFrame<'_> {
    /// Check if this is a fragmented datagram
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse a UDP relay frame without copying its payload
pub fn parse_udp_frame(buf: &[u8]) -> Result<UdpFrame<'_>, Socks5Error> {
    if buf.len() < UDP_FRAME_PREFIX_LEN + 1 {
        return Err(Socks5Error::MalformedHeader(format!(
            "UDP frame too short: {} bytes",
            buf.len()
        )));
    }

    let mut cursor = buf;

    // RSV (2 bytes) - must be 0
    let rsv = cursor.get_u16();
    if rsv != 0 {
        return Err(Socks5Error::MalformedHeader(format!(
            "invalid RSV field: {}",
            rsv
        )));
    }

    // FRAG (1 byte)
    let frag = cursor.get_u8();

    // ATYP (1 byte)
    let atyp = cursor.get_u8();
    let (addr, data) = AddrSpec::decode(atyp, cursor)?;

    Ok(UdpFrame { frag, addr, data })
}

/// Append an unfragmented frame header addressed to `addr`
pub fn write_udp_header(buf: &mut Vec<u8>, addr: &AddrSpec) {
    // RSV (2 bytes)
    buf.put_u16(0);

    // FRAG (1 byte)
    buf.put_u8(0);

    buf.extend_from_slice(&addr.to_bytes());
}
