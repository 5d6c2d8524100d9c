//! Server configuration types
//!
//! Defines the main configuration structures for the relay server.

use super::transport::TcpConfig;
use crate::socks::AddrSpec;
use crate::socks::DEFAULT_BUFFER_SIZE;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener and relay settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Command authorization
    #[serde(default)]
    pub rules: RulesConfig,

    /// Destination redirects
    #[serde(default)]
    pub rewrite: Vec<RewriteConfig>,
}

impl Config {
    /// Check values that deserialize fine but cannot be served
    pub fn validate(&self) -> Result<()> {
        if self.server.buffer_size == 0 {
            bail!("server.buffer_size must be greater than zero");
        }

        if self.server.connect_timeout == 0 {
            bail!("server.connect_timeout must be greater than zero");
        }

        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address: {}", self.server.listen_addr))?;

        for rewrite in &self.rewrite {
            if rewrite.from.is_empty() {
                bail!("Rewrite source must not be empty");
            }
            rewrite.target()?;
        }

        Ok(())
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_max_idle_buffers() -> usize {
    64
}

/// Default connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the SOCKS5 listener binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Size of pooled relay buffers in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Number of idle buffers the pool retains
    #[serde(default = "default_max_idle_buffers")]
    pub max_idle_buffers: usize,

    /// Dial timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Options for outbound TCP connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            buffer_size: default_buffer_size(),
            max_idle_buffers: default_max_idle_buffers(),
            connect_timeout: default_connect_timeout(),
            tcp: TcpConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Which commands clients may issue
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RulesConfig {
    /// Allow CONNECT
    #[serde(default = "default_true")]
    pub allow_connect: bool,

    /// Allow BIND (still answered with "command not supported")
    #[serde(default = "default_true")]
    pub allow_bind: bool,

    /// Allow UDP ASSOCIATE
    #[serde(default = "default_true")]
    pub allow_associate: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            allow_connect: true,
            allow_bind: true,
            allow_associate: true,
        }
    }
}

/// One destination redirect
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Destination as requested by the client (`host:port`)
    pub from: String,

    /// Destination actually dialed (`host:port`)
    pub to: String,
}

impl RewriteConfig {
    /// Parse the redirect target
    pub fn target(&self) -> Result<AddrSpec> {
        parse_host_port(&self.to)
            .with_context(|| format!("Invalid rewrite target for {}: {}", self.from, self.to))
    }
}

/// Parse `ip:port`, `[ipv6]:port` or `name:port`
fn parse_host_port(s: &str) -> Result<AddrSpec> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(AddrSpec::from(addr));
    }

    let (host, port) = match s.rsplit_once(':') {
        Some(parts) => parts,
        None => bail!("missing port"),
    };

    if host.is_empty() || host.contains(':') {
        bail!("invalid host");
    }

    let port = port.parse::<u16>().context("invalid port")?;
    Ok(AddrSpec::from_fqdn(host, port))
}
