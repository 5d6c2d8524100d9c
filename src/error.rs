//! Error types for Socksrelay
//!
//! This module defines the error taxonomy of a SOCKS5 session and the
//! reply codes those errors map to on the wire.

use std::io;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum RelayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 session error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),
}

/// Errors that terminate a single SOCKS5 session
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// The request header could not be decoded
    #[error("malformed request header: {0}")]
    MalformedHeader(String),

    /// The request carried a command other than CONNECT, BIND or ASSOCIATE
    #[error("unrecognized command[{0}]")]
    UnsupportedCommand(u8),

    /// The FQDN destination could not be resolved
    #[error("failed to resolve destination[{fqdn}], {source}")]
    ResolutionFailure {
        /// Name that failed to resolve
        fqdn: String,
        /// Resolver error
        #[source]
        source: io::Error,
    },

    /// The rule set refused the request
    #[error("bind to {0} blocked by rules")]
    RuleDenied(String),

    /// Dialing the destination failed
    #[error("connect to {addr} failed, {source}")]
    DialFailure {
        /// Reply code that was sent to the client
        reply: ReplyCode,
        /// Destination as received from the client
        addr: String,
        /// Dial error
        #[source]
        source: io::Error,
    },

    /// Local environment failure (bind failure, wrong socket type)
    #[error("server failure: {0}")]
    ServerFault(String),

    /// A reply could not be written to the client
    #[error("failed to send reply, {0}")]
    ReplyWriteFailure(#[source] io::Error),

    /// A bound address could not be encoded into a reply
    #[error("failed to format address[{0}]")]
    AddressFormat(String),

    /// A relay loop ended with an I/O error
    #[error("relay terminated: {0}")]
    RelayIo(#[from] io::Error),
}

impl Socks5Error {
    /// Reply code the client was (or would have been) told about
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            Socks5Error::ResolutionFailure { .. } => Some(ReplyCode::HostUnreachable),
            Socks5Error::RuleDenied(_) => Some(ReplyCode::RuleFailure),
            Socks5Error::DialFailure { reply, .. } => Some(*reply),
            Socks5Error::ServerFault(_) => Some(ReplyCode::ServerFailure),
            _ => None,
        }
    }
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Success = 0x00,
    /// General SOCKS server failure
    ServerFailure = 0x01,
    /// Connection not allowed by ruleset
    RuleFailure = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddrTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Classify a dial error into the reply sent to the client.
    ///
    /// Structured error kinds win; the message text is only consulted
    /// when the platform reports a generic kind.
    pub fn from_dial_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => return ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => return ReplyCode::NetworkUnreachable,
            _ => {}
        }

        let msg = err.to_string();
        if msg.contains("refused") {
            ReplyCode::ConnectionRefused
        } else if msg.contains("network is unreachable") {
            ReplyCode::NetworkUnreachable
        } else {
            ReplyCode::HostUnreachable
        }
    }
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Success),
            0x01 => Ok(ReplyCode::ServerFailure),
            0x02 => Ok(ReplyCode::RuleFailure),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddrTypeNotSupported),
            other => Err(Socks5Error::MalformedHeader(format!(
                "unknown reply code {}",
                other
            ))),
        }
    }
}
