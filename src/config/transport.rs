//! Transport configuration types
//!
//! Socket options applied to outbound TCP connections.

use serde::{Deserialize, Serialize};

/// Default keepalive seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default keepalive interval
fn default_keepalive_interval() -> u64 {
    8
}

fn default_nodelay() -> bool {
    true
}

/// TCP socket configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        TcpConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}
