//! lease-gateway
//!
//! An HTTP API gateway that matches each request to a route, leases a
//! downstream endpoint from the route's load balancer and forwards to it.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http::server ──▶ routing::Router ──▶ pipeline::LoadBalancingStage
//!                                                               │  house.get(route key)
//!                                                               │  balancer.lease()
//!                                                               ▼
//!     Client Response                                    http::forward ──▶ Endpoint
//!     ◀─────────────── status mapping ◀── lease released ◀──────┘
//!
//!     config::watcher ──▶ Gateway::apply_config (router swap, stale balancers evicted)
//! ```

use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use lease_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use lease_gateway::observability::{logging, metrics};
use lease_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "lease-gateway")]
#[command(about = "HTTP gateway with per-route load balancing", long_about = None)]
struct Args {
    /// TOML configuration file; watched for changes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!("lease-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        downstream_timeout_secs = config.timeouts.downstream_secs,
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

    // the watcher must stay alive for the lifetime of the server
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let server_shutdown = shutdown.subscribe();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        signal.trigger_on_ctrl_c().await;
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
