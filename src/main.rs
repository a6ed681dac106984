//! lc-proxy
//!
//! A TCP reverse proxy that spreads clients over a fixed backend pool by
//! least active connections and answers repeated `GET` requests from a
//! TTL cache.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────┐
//!                    │                 event loop thread             │
//!   Client ─────────▶│ listener ─▶ selector ─▶ session ─▶ backend ───┼──▶ Backend
//!          ◀─────────│            (reserve)    │    ▲                │
//!                    │                         ▼    │                │
//!                    │                      response cache           │
//!                    └───────────────────────────────────────────────┘
//!                    ┌───────────────────────────────────────────────┐
//!                    │ auxiliary thread: signals, admin surface      │
//!                    └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use lc_proxy::config::{load_config, ProxyConfig};
use lc_proxy::lifecycle::startup;
use lc_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "lc-proxy")]
#[command(about = "Least-connections TCP reverse proxy with a response cache", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used without it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lc-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        max_connections = config.listener.max_connections,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let (mut event_loop, state) = startup::build(&config)?;
    tracing::info!(address = %event_loop.local_addr()?, "Listening for connections");

    let _auxiliary = startup::spawn_auxiliary(&config, state, event_loop.shutdown_handle())?;

    event_loop.run()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
