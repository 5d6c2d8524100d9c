//! SOCKS5 server
//!
//! Owns the injected collaborators and drives one client connection at a
//! time through negotiation, request parsing and the request pipeline.

use crate::config::Config;
use crate::pool::{BufferPool, Executor, TokioExecutor};
use crate::socks::auth::authenticate;
use crate::socks::command::Request;
use crate::socks::consts::DEFAULT_BUFFER_SIZE;
use crate::socks::handler::CommandHandler;
use crate::socks::resolver::{DnsResolver, NameResolver};
use crate::socks::rewriter::{AddressRewriter, StaticRewriter};
use crate::socks::rules::{PermitAll, PermitCommand, RuleSet};
use crate::transport::{Dialer, DirectDialer, SocketOpts};
use anyhow::{Context, Result};
use futures::FutureExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Collaborators the command handlers relay through
#[derive(Clone)]
pub struct RelayEnv {
    /// Opens connections to destinations
    pub dialer: Arc<dyn Dialer>,
    /// Relay buffers
    pub buffer_pool: Arc<BufferPool>,
    /// Runs relay tasks
    pub executor: Arc<dyn Executor>,
}

/// SOCKS5 request engine with its collaborators
pub struct Server {
    pub(crate) resolver: Arc<dyn NameResolver>,
    pub(crate) rewriter: Option<Arc<dyn AddressRewriter>>,
    pub(crate) rules: Arc<dyn RuleSet>,
    pub(crate) env: RelayEnv,
    pub(crate) connect_handler: Option<Arc<dyn CommandHandler>>,
    pub(crate) bind_handler: Option<Arc<dyn CommandHandler>>,
    pub(crate) associate_handler: Option<Arc<dyn CommandHandler>>,
}

impl Server {
    /// Start building a server with default collaborators
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Build a server from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut builder = Server::builder()
            .with_rules(Arc::new(PermitCommand {
                enable_connect: config.rules.allow_connect,
                enable_bind: config.rules.allow_bind,
                enable_associate: config.rules.allow_associate,
            }))
            .with_dialer(Arc::new(
                DirectDialer::with_defaults()
                    .with_socket_opts(SocketOpts::from_tcp_config(&config.server.tcp))
                    .with_connect_timeout(Duration::from_secs(config.server.connect_timeout)),
            ))
            .with_buffer_pool(BufferPool::new(
                config.server.buffer_size,
                config.server.max_idle_buffers,
            ));

        if !config.rewrite.is_empty() {
            let mut rewriter = StaticRewriter::new();
            for rewrite in &config.rewrite {
                rewriter = rewriter.with_route(rewrite.from.clone(), rewrite.target()?);
            }
            info!("Loaded {} destination rewrites", rewriter.len());
            builder = builder.with_rewriter(Arc::new(rewriter));
        }

        Ok(builder.build())
    }

    /// Buffer pool shared by the relay loops
    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.env.buffer_pool
    }

    /// Serve one client connection until its session ends
    ///
    /// # Protocol Flow
    ///
    /// 1. Method negotiation (NO AUTHENTICATION only)
    /// 2. Request parsing
    /// 3. Resolve, rewrite, authorize and dispatch
    pub async fn serve_conn<S>(
        &self,
        mut stream: S,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        let auth_context = authenticate(&mut stream)
            .await
            .with_context(|| "Authentication negotiation failed")?;

        let (reader, writer) = tokio::io::split(stream);

        let mut request = Request::parse(reader)
            .await
            .with_context(|| "Failed to parse SOCKS5 request")?;
        request.auth_context = Some(auth_context);
        request.local_addr = local_addr;
        request.remote_addr = remote_addr;

        info!(
            "SOCKS5 {} request to {}",
            request.header.command, request.raw_dest_addr
        );

        self.handle_request(Box::new(writer), request).await?;
        Ok(())
    }

    /// Accept connections until `shutdown` fires
    ///
    /// Each accepted connection is served as a task submitted to the
    /// executor.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<bool>,
    ) -> Result<()> {
        info!("SOCKS5 server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    debug!("Accepted connection from {}", peer);
                    let server = self.clone();
                    self.env.executor.submit(
                        async move {
                            let local = stream.local_addr().ok();
                            if let Err(e) = server.serve_conn(stream, local, Some(peer)).await {
                                debug!("Session from {} ended: {:#}", peer, e);
                            }
                        }
                        .boxed(),
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    return Ok(());
                }
            }
        }
    }
}

/// Builder for [`Server`]
pub struct ServerBuilder {
    resolver: Arc<dyn NameResolver>,
    rewriter: Option<Arc<dyn AddressRewriter>>,
    rules: Arc<dyn RuleSet>,
    dialer: Arc<dyn Dialer>,
    buffer_pool: Arc<BufferPool>,
    executor: Arc<dyn Executor>,
    connect_handler: Option<Arc<dyn CommandHandler>>,
    bind_handler: Option<Arc<dyn CommandHandler>>,
    associate_handler: Option<Arc<dyn CommandHandler>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        ServerBuilder {
            resolver: Arc::new(DnsResolver),
            rewriter: None,
            rules: Arc::new(PermitAll),
            dialer: Arc::new(DirectDialer::default()),
            buffer_pool: BufferPool::new(DEFAULT_BUFFER_SIZE, 64),
            executor: Arc::new(TokioExecutor),
            connect_handler: None,
            bind_handler: None,
            associate_handler: None,
        }
    }
}

impl ServerBuilder {
    /// Set the name resolver
    pub fn with_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the destination rewriter
    pub fn with_rewriter(mut self, rewriter: Arc<dyn AddressRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Set the authorization rules
    pub fn with_rules(mut self, rules: Arc<dyn RuleSet>) -> Self {
        self.rules = rules;
        self
    }

    /// Set the dialer
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Set the buffer pool
    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = pool;
        self
    }

    /// Set the task executor
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the built-in CONNECT handler
    pub fn with_connect_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.connect_handler = Some(handler);
        self
    }

    /// Replace the built-in BIND handler
    pub fn with_bind_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.bind_handler = Some(handler);
        self
    }

    /// Replace the built-in UDP ASSOCIATE handler
    pub fn with_associate_handler(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.associate_handler = Some(handler);
        self
    }

    /// Finish building
    pub fn build(self) -> Server {
        Server {
            resolver: self.resolver,
            rewriter: self.rewriter,
            rules: self.rules,
            env: RelayEnv {
                dialer: self.dialer,
                buffer_pool: self.buffer_pool,
                executor: self.executor,
            },
            connect_handler: self.connect_handler,
            bind_handler: self.bind_handler,
            associate_handler: self.associate_handler,
        }
    }
}
