//! Docker Swarm function provider.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                SWARM PROVIDER                │
//!   Client Request     │  ┌────────┐    ┌──────────┐    ┌─────────┐   │
//!   ───────────────────┼─▶│  http  │───▶│ resolver │───▶│  proxy  │───┼──▶ function replica
//!                      │  │ server │    └────┬─────┘    └─────────┘   │
//!                      │  └───┬────┘         │                        │
//!                      │      │         ┌────▼─────┐                  │
//!                      │      ├────────▶│  swarm   │──────────────────┼──▶ Docker Engine API
//!                      │      │         │  client  │                  │
//!                      │  ┌───▼────┐    └────▲─────┘                  │
//!                      │  │  logs  │─────────┤                        │
//!                      │  ├────────┤         │                        │
//!                      │  │replicas│─────────┘                        │
//!                      │  └────────┘                                  │
//!                      │  config · observability · lifecycle          │
//!                      └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use swarm_provider::config::loader::{from_env, load_config, OsEnv};
use swarm_provider::config::watcher::ConfigWatcher;
use swarm_provider::lifecycle::signals::spawn_signal_handler;
use swarm_provider::observability::{logging, metrics};
use swarm_provider::swarm::SwarmClient;
use swarm_provider::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "swarm-provider")]
#[command(about = "Function provider for Docker Swarm", long_about = None)]
struct Args {
    /// TOML configuration file. Without one, defaults plus environment are used.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => from_env(&OsEnv)?,
    };

    logging::init(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "swarm-provider starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        engine = %config.engine.host,
        dns_round_robin = config.resolver.dns_round_robin,
        read_timeout_secs = config.timeouts.read_secs,
        write_timeout_secs = config.timeouts.write_secs,
        "Configuration loaded"
    );

    // Fail fast when the engine is unreachable.
    let engine = SwarmClient::new(&config.engine)?;
    let version = engine.version().await?;
    tracing::info!(
        engine_version = %version.version,
        api_version = %version.api_version,
        "Connected to Docker Engine"
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

    // Keep the watcher alive for the life of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => (tokio::sync::mpsc::unbounded_channel().1, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
