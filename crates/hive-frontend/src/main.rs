//! DeviceHive frontend
//!
//! Accepts client websocket and HTTP sessions and talks to the backend shards
//! over the RPC bus.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use hive_core::auth::{InMemoryDeviceDirectory, StaticTokenAuthenticator};
use hive_core::config::load_config;
use hive_core::time::SystemClock;
use hive_core::tracing_init::init_tracing;

use hive_frontend::bus::BusRegistry;
use hive_frontend::server::{AppState, build_router};
use hive_frontend::transport::spawn_transports;

#[derive(Parser, Debug)]
#[command(name = "hive-frontend")]
#[command(
    version,
    about = "DeviceHive frontend - client sessions over the backend RPC bus"
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides the configuration file.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Backend shard endpoint, repeatable, in shard order.
    #[arg(long = "bus-endpoint")]
    bus_endpoints: Vec<String>,

    /// RPC request timeout in seconds.
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Subscribe acknowledgement timeout in seconds.
    #[arg(long)]
    subscribe_timeout: Option<u64>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("hive_frontend=info", args.log_json)?;

    let mut config = load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.listen_addr = addr.to_string();
    }
    if !args.bus_endpoints.is_empty() {
        config.bus.endpoints = args.bus_endpoints;
    }
    if let Some(secs) = args.request_timeout {
        config.bus.request_timeout_secs = secs;
    }
    if let Some(secs) = args.subscribe_timeout {
        config.bus.subscribe_timeout_secs = secs;
    }
    if config.bus.endpoints.is_empty() {
        anyhow::bail!("No backend bus endpoints configured");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr,
        shards = config.bus.endpoints.len(),
        "Starting hive-frontend"
    );
    if config.auth.tokens.is_empty() {
        warn!("No access tokens configured; every request will be rejected");
    }

    let registry = BusRegistry::new(config.bus.endpoints.len());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let transports = spawn_transports(&config.bus, &registry, &shutdown_rx);

    let state = AppState::new(
        &config,
        registry,
        Arc::new(StaticTokenAuthenticator::from_config(&config.auth)),
        Arc::new(InMemoryDeviceDirectory::new(config.devices.clone())),
        Arc::new(SystemClock),
    );
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "Listening for clients");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for transport in transports {
        let _ = transport.await;
    }
    info!("Frontend stopped");
    Ok(())
}
