//! SOCKS5 reply encoder
//!
//! Builds replies from the request header: the command byte becomes the
//! reply code and the address fields become the bound address.

use crate::error::{ReplyCode, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::{AddrSpec, Header};
use std::net::{IpAddr, Ipv4Addr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode a reply without sending it
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Without a bound address the reply carries `0.0.0.0:0`. An address with
/// neither a name nor an IP cannot be encoded.
pub fn encode_reply(
    header: &Header,
    code: ReplyCode,
    bind_addr: Option<&AddrSpec>,
) -> Result<Vec<u8>, Socks5Error> {
    let mut reply = header.clone();
    reply.command = code.into();
    reply.reserved = SOCKS5_RESERVED;

    match bind_addr {
        None => {
            reply.addr_type = SOCKS5_ADDR_TYPE_IPV4;
            reply.address = AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        }
        Some(addr) if addr.is_fqdn() => {
            reply.addr_type = SOCKS5_ADDR_TYPE_DOMAIN;
            reply.address = AddrSpec::from_fqdn(addr.fqdn.clone(), addr.port);
        }
        Some(addr) => {
            let ip = match addr.ip {
                Some(IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                    Some(v4) => IpAddr::V4(v4),
                    None => IpAddr::V6(v6),
                },
                Some(ip) => ip,
                None => return Err(Socks5Error::AddressFormat(format!("{:?}", addr))),
            };
            reply.addr_type = match ip {
                IpAddr::V4(_) => SOCKS5_ADDR_TYPE_IPV4,
                IpAddr::V6(_) => SOCKS5_ADDR_TYPE_IPV6,
            };
            reply.address = AddrSpec::from_ip(ip, addr.port);
        }
    }

    Ok(reply.to_bytes())
}

/// Build and send a SOCKS5 reply
///
/// # Arguments
///
/// * `writer` - The client stream to write to
/// * `header` - Header of the request being answered
/// * `code` - The reply status code
/// * `bind_addr` - The bound address (optional, defaults to 0.0.0.0:0)
pub async fn send_reply<W>(
    writer: &mut W,
    header: &Header,
    code: ReplyCode,
    bind_addr: Option<&AddrSpec>,
) -> Result<(), Socks5Error>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let reply = encode_reply(header, code, bind_addr)?;

    writer
        .write_all(&reply)
        .await
        .map_err(Socks5Error::ReplyWriteFailure)?;
    writer
        .flush()
        .await
        .map_err(Socks5Error::ReplyWriteFailure)?;

    Ok(())
}
