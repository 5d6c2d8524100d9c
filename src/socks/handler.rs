//! Request pipeline
//!
//! Resolves, rewrites and authorizes a parsed request, then dispatches it
//! to the handler for its command.

use crate::error::{ReplyCode, Socks5Error};
use crate::socks::command::{send_reply, Request};
use crate::socks::context::Context;
use crate::socks::server::Server;
use crate::socks::tcp_relay::handle_connect;
use crate::socks::types::Command;
use crate::socks::udp::handle_associate;
use crate::transport::BoxWriter;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Replacement for one of the built-in command handlers
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Serve an authorized request; `writer` is the client's write half
    async fn handle(
        &self,
        ctx: Context,
        writer: BoxWriter,
        request: Request,
    ) -> Result<(), Socks5Error>;
}

impl Server {
    /// Run a parsed request through resolve, rewrite, authorize and dispatch
    ///
    /// Every failure before the command handler runs is answered with one
    /// reply before the error is returned.
    pub async fn handle_request(
        &self,
        mut writer: BoxWriter,
        mut request: Request,
    ) -> Result<(), Socks5Error> {
        let mut ctx = Context::new();

        let mut dest = request.raw_dest_addr.clone();
        if dest.is_fqdn() {
            match self.resolver.resolve(ctx, &dest.fqdn).await {
                Ok((resolved_ctx, ip)) => {
                    ctx = resolved_ctx;
                    dest.ip = Some(ip);
                }
                Err(e) => {
                    warn!("Failed to resolve {}: {}", dest.fqdn, e);
                    send_reply(&mut writer, &request.header, ReplyCode::HostUnreachable, None)
                        .await?;
                    return Err(Socks5Error::ResolutionFailure {
                        fqdn: dest.fqdn,
                        source: e,
                    });
                }
            }
        }
        request.dest_addr = dest;

        if let Some(rewriter) = &self.rewriter {
            let (rewritten_ctx, dest) = rewriter.rewrite(ctx, &request).await;
            ctx = rewritten_ctx;
            request.dest_addr = dest;
        }

        let (ctx, allowed) = self.rules.allow(ctx, &request).await;
        if !allowed {
            warn!(
                "{} to {} blocked by rules",
                request.header.command, request.dest_addr
            );
            send_reply(&mut writer, &request.header, ReplyCode::RuleFailure, None).await?;
            return Err(Socks5Error::RuleDenied(request.raw_dest_addr.to_string()));
        }

        let command = match request.command() {
            Some(command) => command,
            None => {
                send_reply(
                    &mut writer,
                    &request.header,
                    ReplyCode::CommandNotSupported,
                    None,
                )
                .await?;
                return Err(Socks5Error::UnsupportedCommand(request.header.command));
            }
        };

        debug!("Dispatching {} to {}", command, request.dest_addr);

        match command {
            Command::Connect => match &self.connect_handler {
                Some(handler) => handler.handle(ctx, writer, request).await,
                None => handle_connect(&self.env, ctx, writer, request).await,
            },
            Command::Bind => match &self.bind_handler {
                Some(handler) => handler.handle(ctx, writer, request).await,
                None => handle_bind(writer, request).await,
            },
            Command::Associate => match &self.associate_handler {
                Some(handler) => handler.handle(ctx, writer, request).await,
                None => handle_associate(&self.env, ctx, writer, request).await,
            },
        }
    }
}

/// BIND is answered with "command not supported"
async fn handle_bind(mut writer: BoxWriter, request: Request) -> Result<(), Socks5Error> {
    warn!("BIND command not supported");
    send_reply(
        &mut writer,
        &request.header,
        ReplyCode::CommandNotSupported,
        None,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::consts::*;
    use crate::socks::resolver::NameResolver;
    use crate::socks::rewriter::StaticRewriter;
    use crate::socks::rules::{PermitCommand, PermitNone};
    use crate::socks::types::AddrSpec;
    use crate::transport::{Connection, Dialer, Network};
    use std::io::{self, Cursor};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::{Arc, Mutex};
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    struct FixedResolver(Option<IpAddr>);

    #[async_trait]
    impl NameResolver for FixedResolver {
        async fn resolve(&self, ctx: Context, fqdn: &str) -> io::Result<(Context, IpAddr)> {
            match self.0 {
                Some(ip) => Ok((ctx.with_value("resolved", fqdn), ip)),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such host")),
            }
        }
    }

    /// Records dial targets and always fails with "connection refused"
    #[derive(Default)]
    struct RecordingDialer {
        dialed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dialer for RecordingDialer {
        async fn dial(&self, _ctx: &Context, _network: Network, addr: &str) -> io::Result<Connection> {
            self.dialed.lock().unwrap().push(addr.to_string());
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        }
    }

    struct RecordingHandler {
        seen: Mutex<Option<(Context, AddrSpec, AddrSpec)>>,
    }

    #[async_trait]
    impl CommandHandler for RecordingHandler {
        async fn handle(
            &self,
            ctx: Context,
            _writer: BoxWriter,
            request: Request,
        ) -> Result<(), Socks5Error> {
            *self.seen.lock().unwrap() = Some((ctx, request.raw_dest_addr, request.dest_addr));
            Ok(())
        }
    }

    async fn request(command: u8, addr: &[u8]) -> Request {
        let mut bytes = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED];
        bytes.extend_from_slice(addr);
        Request::parse(Cursor::new(bytes)).await.unwrap()
    }

    fn domain_addr(name: &str, port: u16) -> Vec<u8> {
        let mut bytes = vec![SOCKS5_ADDR_TYPE_DOMAIN, name.len() as u8];
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(&port.to_be_bytes());
        bytes
    }

    fn client_pipe() -> (BoxWriter, DuplexStream) {
        let (client, server) = duplex(1024);
        (Box::new(server), client)
    }

    async fn read_reply_code(client: &mut DuplexStream) -> u8 {
        let mut head = [0u8; 10];
        client.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], SOCKS5_VERSION);
        head[1]
    }

    #[tokio::test]
    async fn test_resolution_failure_replies_host_unreachable() {
        let dialer = Arc::new(RecordingDialer::default());
        let server = Server::builder()
            .with_resolver(Arc::new(FixedResolver(None)))
            .with_dialer(dialer.clone())
            .build();
        let (writer, mut client) = client_pipe();

        let req = request(SOCKS5_CMD_TCP_CONNECT, &domain_addr("nowhere.invalid", 80)).await;
        let err = server.handle_request(writer, req).await.unwrap_err();

        assert!(matches!(err, Socks5Error::ResolutionFailure { .. }));
        assert_eq!(read_reply_code(&mut client).await, ReplyCode::HostUnreachable as u8);
        assert!(dialer.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_domain_replies_host_unreachable() {
        let dialer = Arc::new(RecordingDialer::default());
        let server = Server::builder()
            .with_resolver(Arc::new(FixedResolver(None)))
            .with_dialer(dialer.clone())
            .build();
        let (writer, mut client) = client_pipe();

        let req = request(
            SOCKS5_CMD_TCP_CONNECT,
            &[SOCKS5_ADDR_TYPE_DOMAIN, 2, 0xC3, 0x28, 0, 80],
        )
        .await;
        let err = server.handle_request(writer, req).await.unwrap_err();

        assert!(matches!(err, Socks5Error::ResolutionFailure { .. }));
        assert_eq!(read_reply_code(&mut client).await, ReplyCode::HostUnreachable as u8);
        assert!(dialer.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolved_ip_fills_destination() {
        let handler = Arc::new(RecordingHandler { seen: Mutex::new(None) });
        let server = Server::builder()
            .with_resolver(Arc::new(FixedResolver(Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))))))
            .with_connect_handler(handler.clone())
            .build();
        let (writer, _client) = client_pipe();

        let req = request(SOCKS5_CMD_TCP_CONNECT, &domain_addr("example.com", 443)).await;
        server.handle_request(writer, req).await.unwrap();

        let (ctx, raw, dest) = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(ctx.value("resolved"), Some("example.com"));
        assert_eq!(raw, AddrSpec::from_fqdn("example.com", 443));
        assert_eq!(dest.fqdn, "example.com");
        assert_eq!(dest.ip, Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert_eq!(dest.to_string(), "10.1.2.3:443");
    }

    #[tokio::test]
    async fn test_rewriter_replaces_destination() {
        let handler = Arc::new(RecordingHandler { seen: Mutex::new(None) });
        let rewriter = StaticRewriter::new().with_route(
            "10.0.0.1:80",
            AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
        );
        let server = Server::builder()
            .with_rewriter(Arc::new(rewriter))
            .with_connect_handler(handler.clone())
            .build();
        let (writer, _client) = client_pipe();

        let req = request(
            SOCKS5_CMD_TCP_CONNECT,
            &[SOCKS5_ADDR_TYPE_IPV4, 10, 0, 0, 1, 0, 80],
        )
        .await;
        server.handle_request(writer, req).await.unwrap();

        let (_, raw, dest) = handler.seen.lock().unwrap().take().unwrap();
        assert_eq!(raw.to_string(), "10.0.0.1:80");
        assert_eq!(dest.to_string(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_rule_denial_replies_rule_failure() {
        let dialer = Arc::new(RecordingDialer::default());
        let server = Server::builder()
            .with_rules(Arc::new(PermitNone))
            .with_dialer(dialer.clone())
            .build();
        let (writer, mut client) = client_pipe();

        let req = request(
            SOCKS5_CMD_TCP_CONNECT,
            &[SOCKS5_ADDR_TYPE_IPV4, 93, 184, 216, 34, 0, 80],
        )
        .await;
        let err = server.handle_request(writer, req).await.unwrap_err();

        assert!(err.to_string().contains("93.184.216.34:80"));
        assert_eq!(read_reply_code(&mut client).await, ReplyCode::RuleFailure as u8);
        assert!(dialer.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_replies_command_not_supported() {
        let dialer = Arc::new(RecordingDialer::default());
        let server = Server::builder().with_dialer(dialer.clone()).build();
        let (writer, mut client) = client_pipe();

        let req = request(
            SOCKS5_CMD_TCP_BIND,
            &[SOCKS5_ADDR_TYPE_IPV4, 0, 0, 0, 0, 0, 0],
        )
        .await;
        server.handle_request(writer, req).await.unwrap();

        assert_eq!(
            read_reply_code(&mut client).await,
            ReplyCode::CommandNotSupported as u8
        );
        assert!(dialer.dialed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_at_dispatch() {
        let server = Server::builder().build();
        let (writer, mut client) = client_pipe();

        let mut req = request(
            SOCKS5_CMD_TCP_CONNECT,
            &[SOCKS5_ADDR_TYPE_IPV4, 127, 0, 0, 1, 0, 80],
        )
        .await;
        req.header.command = 0x7F;

        let err = server.handle_request(writer, req).await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedCommand(0x7F)));
        assert_eq!(
            read_reply_code(&mut client).await,
            ReplyCode::CommandNotSupported as u8
        );
    }

    #[tokio::test]
    async fn test_command_rules() {
        let server = Server::builder()
            .with_rules(Arc::new(PermitCommand {
                enable_connect: true,
                enable_bind: true,
                enable_associate: false,
            }))
            .build();
        let (writer, mut client) = client_pipe();

        let req = request(
            SOCKS5_CMD_UDP_ASSOCIATE,
            &[SOCKS5_ADDR_TYPE_IPV4, 0, 0, 0, 0, 0, 0],
        )
        .await;
        assert!(server.handle_request(writer, req).await.is_err());
        assert_eq!(read_reply_code(&mut client).await, ReplyCode::RuleFailure as u8);
    }

    #[tokio::test]
    async fn test_dial_failure_goes_to_dialer_with_dest_addr() {
        let dialer = Arc::new(RecordingDialer::default());
        let server = Server::builder().with_dialer(dialer.clone()).build();
        let (writer, mut client) = client_pipe();

        let req = request(
            SOCKS5_CMD_TCP_CONNECT,
            &[SOCKS5_ADDR_TYPE_IPV4, 192, 0, 2, 1, 0x1F, 0x90],
        )
        .await;
        let err = server.handle_request(writer, req).await.unwrap_err();

        assert_eq!(err.reply_code(), Some(ReplyCode::ConnectionRefused));
        assert_eq!(
            read_reply_code(&mut client).await,
            ReplyCode::ConnectionRefused as u8
        );
        assert_eq!(*dialer.dialed.lock().unwrap(), vec!["192.0.2.1:8080".to_string()]);
    }
}
