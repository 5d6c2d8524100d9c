//! # Socksrelay - SOCKS5 Request Execution and Relay Engine
//!
//! Socksrelay is the server side of the SOCKS5 protocol after method
//! negotiation: it parses a request, resolves, rewrites and authorizes its
//! destination, executes CONNECT or UDP ASSOCIATE (BIND is answered with
//! "command not supported"), and relays bytes or datagrams until the
//! session ends.
//!
//! ## Features
//!
//! - **Pluggable collaborators**: resolver, rewriter, rule set and dialer are
//!   traits injected into the [`Server`]
//! - **Pooled buffers**: every relay loop borrows its buffers from a shared
//!   [`pool::BufferPool`]
//! - **UDP ASSOCIATE**: one return path per client source address, tracked in
//!   a concurrent session table
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksrelay::config::load_config;
//! use socksrelay::Server;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let server = Arc::new(Server::from_config(&config)?);
//!     let listener = TcpListener::bind(&config.server.listen_addr).await?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     server.serve(listener, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Socksrelay -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod pool;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{RelayError, ReplyCode, Socks5Error};
pub use socks::Server;

/// Version of the Socksrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "socksrelay");
    }
}
