//! Transparent destination rewriting

use super::command::Request;
use super::context::Context;
use super::types::AddrSpec;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Replaces the destination of a request before it is authorized
#[async_trait]
pub trait AddressRewriter: Send + Sync {
    /// Return a possibly updated context and the destination to dial.
    /// The returned address replaces `request.dest_addr` as is.
    async fn rewrite(&self, ctx: Context, request: &Request) -> (Context, AddrSpec);
}

/// Rewriter driven by a fixed `host:port -> destination` table.
///
/// Lookups use the destination as the client sent it, so both a domain
/// (`example.com:80`) and a literal (`10.0.0.1:80`) can be redirected.
#[derive(Debug, Clone, Default)]
pub struct StaticRewriter {
    routes: HashMap<String, AddrSpec>,
}

impl StaticRewriter {
    /// Create an empty rewriter
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a redirect from `from` (`host:port`) to `to`
    pub fn with_route(mut self, from: impl Into<String>, to: AddrSpec) -> Self {
        self.routes.insert(from.into(), to);
        self
    }

    /// Number of configured routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are configured
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn lookup(&self, addr: &AddrSpec) -> Option<&AddrSpec> {
        let key = if addr.is_fqdn() {
            format!("{}:{}", addr.fqdn, addr.port)
        } else {
            addr.to_string()
        };
        self.routes.get(&key)
    }
}

#[async_trait]
impl AddressRewriter for StaticRewriter {
    async fn rewrite(&self, ctx: Context, request: &Request) -> (Context, AddrSpec) {
        match self.lookup(&request.raw_dest_addr) {
            Some(to) => {
                debug!("Rewriting {} to {}", request.raw_dest_addr, to);
                (ctx, to.clone())
            }
            None => (ctx, request.dest_addr.clone()),
        }
    }
}
