//! Swindon chat gateway.
//!
//! Terminates client WebSocket connections and turns every chat call into
//! an HTTP POST against a backend application.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌────────────────────────────────────────────────────┐
//!                 │                   CHAT GATEWAY                     │
//!                 │                                                    │
//!   WebSocket     │  ┌─────────┐    ┌──────────┐    ┌──────────────┐   │
//!   ──────────────┼─▶│  http   │───▶│ session  │───▶│ router +     │   │    HTTP POST
//!                 │  │ upgrade │    │ (1/conn) │    │ backend      │───┼──────────▶ Backend
//!                 │  └─────────┘    └────┬─────┘    └──────┬───────┘   │
//!   ◀─────────────┼──────────────────────┘                 │           │
//!   hello/result/ │                      ▲   translator    │           │
//!   close         │                      └─────────────────┘           │
//!                 │                                                    │
//!                 │  config (TOML + reload) · observability · lifecycle │
//!                 └────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use swindon_chat::config::loader::load_config;
use swindon_chat::config::watcher::ConfigWatcher;
use swindon_chat::config::GatewayConfig;
use swindon_chat::http::HttpServer;
use swindon_chat::lifecycle::{signals, Shutdown};
use swindon_chat::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "swindon-chat")]
#[command(about = "WebSocket chat gateway in front of an HTTP backend", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("swindon-chat v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        chat_path = %config.chat.path,
        backend = %config.backend.base_url,
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher stops when dropped, so it lives as long as main.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(config, shutdown);
    server.run(listener, config_updates).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
