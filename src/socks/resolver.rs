//! Name resolution for FQDN destinations

use super::context::Context;
use async_trait::async_trait;
use std::io;
use std::net::IpAddr;
use tracing::debug;

/// Resolves a domain name to the IP address that will be dialed
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve `fqdn`, returning a possibly updated context
    async fn resolve(&self, ctx: Context, fqdn: &str) -> io::Result<(Context, IpAddr)>;
}

/// Resolver backed by the system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve(&self, ctx: Context, fqdn: &str) -> io::Result<(Context, IpAddr)> {
        let addr = tokio::net::lookup_host((fqdn, 0))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {}", fqdn),
                )
            })?;

        debug!("Resolved {} to {}", fqdn, addr.ip());
        Ok((ctx, addr.ip()))
    }
}
