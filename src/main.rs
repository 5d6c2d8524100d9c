//! Socksrelay - SOCKS5 proxy server
//!
//! This is the main entry point for the Socksrelay application.

use anyhow::Result;
use clap::Parser;
use socksrelay::config::{load_config, Config};
use socksrelay::{RelayError, Server};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Socksrelay - SOCKS5 proxy server with TCP and UDP relay
#[derive(Parser, Debug)]
#[command(name = "socksrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration file
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };

    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }

    let listen_addr: SocketAddr = config.server.listen_addr.parse().map_err(|e| {
        RelayError::Config(format!(
            "invalid listen address {}: {}",
            config.server.listen_addr, e
        ))
    })?;

    info!("Socksrelay v{}", socksrelay::VERSION);

    let server = Arc::new(Server::from_config(&config)?);
    let listener = TcpListener::bind(listen_addr).await.map_err(RelayError::Io)?;

    // Setup shutdown signal
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            info!("Received Ctrl+C, shutting down...");
                        }
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM, shutting down...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to setup SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Received Ctrl+C, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx.send(true);
    });

    // Run the server
    server.serve(listener, shutdown_rx).await
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
