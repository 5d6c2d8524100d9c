//! SOCKS5 type definitions
//!
//! Defines the command, destination and header types shared by the
//! request parser, the reply encoder and the UDP relay frame codec.

use super::consts::*;
use crate::error::Socks5Error;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay
    Associate,
}

impl Command {
    /// Parse a command byte into Command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(Command::Connect),
            SOCKS5_CMD_TCP_BIND => Some(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(Command::Associate),
            _ => None,
        }
    }

    /// Convert Command to byte
    pub fn to_byte(self) -> u8 {
        match self {
            Command::Connect => SOCKS5_CMD_TCP_CONNECT,
            Command::Bind => SOCKS5_CMD_TCP_BIND,
            Command::Associate => SOCKS5_CMD_UDP_ASSOCIATE,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::Associate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// Destination of a request: a domain name or an IP address, plus a port.
///
/// A non-empty `fqdn` takes precedence when encoding. Once a name has been
/// resolved, `ip` holds the address that is actually dialed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddrSpec {
    /// Domain name, empty for IP destinations
    pub fqdn: String,
    /// IP address, set for IP destinations and after resolution
    pub ip: Option<IpAddr>,
    /// Port number
    pub port: u16,
}

impl AddrSpec {
    /// Create an IP destination
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        AddrSpec {
            fqdn: String::new(),
            ip: Some(ip),
            port,
        }
    }

    /// Create a domain name destination
    pub fn from_fqdn(fqdn: impl Into<String>, port: u16) -> Self {
        AddrSpec {
            fqdn: fqdn.into(),
            ip: None,
            port,
        }
    }

    /// Whether this destination names a host rather than an address
    pub fn is_fqdn(&self) -> bool {
        !self.fqdn.is_empty()
    }

    /// The socket address, if an IP is known
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Address type byte this destination encodes as
    pub fn addr_type(&self) -> u8 {
        if self.is_fqdn() {
            return SOCKS5_ADDR_TYPE_DOMAIN;
        }
        match self.ip {
            Some(IpAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            _ => SOCKS5_ADDR_TYPE_IPV4,
        }
    }

    /// Serialize ATYP + ADDR + PORT using the address type implied by `self`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 16 + 2);
        encode_address(&mut bytes, self.addr_type(), self);
        bytes
    }

    /// Read ADDR + PORT of the given type from a stream
    pub async fn read_from<R>(reader: &mut R, addr_type: u8) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let mut addr = [0u8; 4];
                reader.read_exact(&mut addr).await.map_err(truncated)?;
                let port = reader.read_u16().await.map_err(truncated)?;
                Ok(AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::from(addr)), port))
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = reader.read_u8().await.map_err(truncated)? as usize;
                if len == 0 {
                    return Err(Socks5Error::MalformedHeader(
                        "empty domain name".to_string(),
                    ));
                }
                let mut domain = vec![0u8; len];
                reader.read_exact(&mut domain).await.map_err(truncated)?;
                let port = reader.read_u16().await.map_err(truncated)?;
                let fqdn = String::from_utf8_lossy(&domain).into_owned();
                Ok(AddrSpec::from_fqdn(fqdn, port))
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                let mut addr = [0u8; 16];
                reader.read_exact(&mut addr).await.map_err(truncated)?;
                let port = reader.read_u16().await.map_err(truncated)?;
                Ok(AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::from(addr)), port))
            }

            other => Err(Socks5Error::MalformedHeader(format!(
                "unrecognized address type {}",
                other
            ))),
        }
    }

    /// Decode ADDR + PORT of the given type from a buffer, returning the rest
    pub fn decode(addr_type: u8, buf: &[u8]) -> Result<(Self, &[u8]), Socks5Error> {
        match addr_type {
            SOCKS5_ADDR_TYPE_IPV4 => {
                if buf.len() < 6 {
                    return Err(short_buffer("IPv4 address"));
                }
                let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
                let port = u16::from_be_bytes([buf[4], buf[5]]);
                Ok((AddrSpec::from_ip(IpAddr::V4(ip), port), &buf[6..]))
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let len = *buf.first().ok_or_else(|| short_buffer("domain length"))? as usize;
                let buf = &buf[1..];
                if len == 0 || buf.len() < len + 2 {
                    return Err(short_buffer("domain name"));
                }
                let fqdn = String::from_utf8_lossy(&buf[..len]).into_owned();
                let port = u16::from_be_bytes([buf[len], buf[len + 1]]);
                Ok((AddrSpec::from_fqdn(fqdn, port), &buf[len + 2..]))
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                if buf.len() < 18 {
                    return Err(short_buffer("IPv6 address"));
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[..16]);
                let port = u16::from_be_bytes([buf[16], buf[17]]);
                Ok((
                    AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::from(octets)), port),
                    &buf[18..],
                ))
            }

            other => Err(Socks5Error::MalformedHeader(format!(
                "unrecognized address type {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AddrSpec {
    /// Formats the dialable form: the IP when known, the name otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.socket_addr() {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "{}:{}", self.fqdn, self.port),
        }
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::from_ip(addr.ip(), addr.port())
    }
}

/// Parsed SOCKS5 request/reply framing.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Replies reuse the same layout with CMD carrying the reply code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version
    pub version: u8,
    /// Command byte, or reply code for replies
    pub command: u8,
    /// Reserved byte
    pub reserved: u8,
    /// Address type
    pub addr_type: u8,
    /// Destination or bound address
    pub address: AddrSpec,
}

impl Header {
    /// Read a header from the stream
    pub async fn parse<R>(reader: &mut R) -> Result<Self, Socks5Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut head = [0u8; 4];
        reader.read_exact(&mut head).await.map_err(truncated)?;

        let [version, command, reserved, addr_type] = head;
        if version != SOCKS5_VERSION {
            return Err(Socks5Error::MalformedHeader(format!(
                "unsupported SOCKS version {}",
                version
            )));
        }

        let address = AddrSpec::read_from(reader, addr_type).await?;

        Ok(Header {
            version,
            command,
            reserved,
            addr_type,
            address,
        })
    }

    /// Serialize the header in wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.version, self.command, self.reserved];
        encode_address(&mut bytes, self.addr_type, &self.address);
        bytes
    }
}

/// Write ATYP + ADDR + PORT for an explicit address type
fn encode_address(bytes: &mut Vec<u8>, addr_type: u8, addr: &AddrSpec) {
    bytes.push(addr_type);
    match addr_type {
        SOCKS5_ADDR_TYPE_DOMAIN => {
            let name = addr.fqdn.as_bytes();
            let len = name.len().min(MAX_DOMAIN_LEN);
            bytes.push(len as u8);
            bytes.extend_from_slice(&name[..len]);
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            let ip = match addr.ip {
                Some(IpAddr::V6(ip)) => ip,
                Some(IpAddr::V4(ip)) => ip.to_ipv6_mapped(),
                None => Ipv6Addr::UNSPECIFIED,
            };
            bytes.extend_from_slice(&ip.octets());
        }
        _ => {
            let ip = match addr.ip {
                Some(IpAddr::V4(ip)) => ip,
                Some(IpAddr::V6(ip)) => ip.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
                None => Ipv4Addr::UNSPECIFIED,
            };
            bytes.extend_from_slice(&ip.octets());
        }
    }
    bytes.extend_from_slice(&addr.port.to_be_bytes());
}

fn truncated(err: std::io::Error) -> Socks5Error {
    Socks5Error::MalformedHeader(format!("truncated header: {}", err))
}

fn short_buffer(what: &str) -> Socks5Error {
    Socks5Error::MalformedHeader(format!("buffer too short for {}", what))
}
