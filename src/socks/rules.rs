//! Request authorization rules

use super::command::Request;
use super::context::Context;
use super::types::Command;
use async_trait::async_trait;

/// Decides whether a request may proceed
#[async_trait]
pub trait RuleSet: Send + Sync {
    /// Return a possibly updated context and whether the request is allowed
    async fn allow(&self, ctx: Context, request: &Request) -> (Context, bool);
}

/// Allows every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

#[async_trait]
impl RuleSet for PermitAll {
    async fn allow(&self, ctx: Context, _request: &Request) -> (Context, bool) {
        (ctx, true)
    }
}

/// Denies every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitNone;

#[async_trait]
impl RuleSet for PermitNone {
    async fn allow(&self, ctx: Context, _request: &Request) -> (Context, bool) {
        (ctx, false)
    }
}

/// Allows requests by command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitCommand {
    /// Allow CONNECT
    pub enable_connect: bool,
    /// Allow BIND
    pub enable_bind: bool,
    /// Allow UDP ASSOCIATE
    pub enable_associate: bool,
}

impl Default for PermitCommand {
    fn default() -> Self {
        PermitCommand {
            enable_connect: true,
            enable_bind: true,
            enable_associate: true,
        }
    }
}

#[async_trait]
impl RuleSet for PermitCommand {
    async fn allow(&self, ctx: Context, request: &Request) -> (Context, bool) {
        let allowed = match request.command() {
            Some(Command::Connect) => self.enable_connect,
            Some(Command::Bind) => self.enable_bind,
            Some(Command::Associate) => self.enable_associate,
            None => false,
        };
        (ctx, allowed)
    }
}
