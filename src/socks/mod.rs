//! SOCKS5 module for Socksrelay
//!
//! This module executes SOCKS5 requests: it parses the request, runs the
//! resolve, rewrite and authorize pipeline, and relays TCP streams
//! (CONNECT) or UDP datagrams (UDP ASSOCIATE) until the session ends.

mod auth;
mod closer;
mod command;
mod consts;
mod context;
mod handler;
mod resolver;
mod rewriter;
mod rules;
mod server;
mod tcp_relay;
mod types;
mod udp;

pub use auth::authenticate;
pub use closer::{closed_error, CloseGuard, Closer};
pub use command::{encode_reply, send_reply, Request};
pub use consts::*;
pub use context::{AuthContext, Context};
pub use handler::CommandHandler;
pub use resolver::{DnsResolver, NameResolver};
pub use rewriter::{AddressRewriter, StaticRewriter};
pub use rules::{PermitAll, PermitCommand, PermitNone, RuleSet};
pub use server::{RelayEnv, Server, ServerBuilder};
pub use tcp_relay::{handle_connect, proxy};
pub use types::{AddrSpec, Command, Header};
pub use udp::{
    handle_associate, parse_udp_frame, write_udp_header, RelaySocket, SessionTable, UdpFrame,
};
