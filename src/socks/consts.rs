//! SOCKS5 protocol constants
//!
//! Defines the wire constants used by the request engine.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;
/// TCP BIND command (answered with "command not supported")
pub const SOCKS5_CMD_TCP_BIND: u8 = 0x02;
/// UDP ASSOCIATE command
pub const SOCKS5_CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// Length of RSV + FRAG in a UDP relay frame
pub const UDP_FRAME_PREFIX_LEN: usize = 3;

/// Default size of pooled relay buffers
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks5_version() {
        assert_eq!(SOCKS5_VERSION, 5);
    }

    #[test]
    fn test_commands() {
        assert_eq!(SOCKS5_CMD_TCP_CONNECT, 1);
        assert_eq!(SOCKS5_CMD_TCP_BIND, 2);
        assert_eq!(SOCKS5_CMD_UDP_ASSOCIATE, 3);
    }

    #[test]
    fn test_address_types() {
        assert_eq!(SOCKS5_ADDR_TYPE_IPV4, 1);
        assert_eq!(SOCKS5_ADDR_TYPE_DOMAIN, 3);
        assert_eq!(SOCKS5_ADDR_TYPE_IPV6, 4);
    }
}
