use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::gateway::Gateway;
use tollgate::server::GatewayServer;
use tollgate::upstream::HttpUpstream;

/// API gateway: rate limiting, circuit breaking, routing and versioning.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Tollgate API Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    let addr = args.listen.unwrap_or(config.server.listen_addr);
    info!(listen_addr = %addr, services = config.services.len(), "Configuration loaded");

    let mut gateway = Gateway::from_config(&config, None)?;
    gateway.start_sweeper();
    let gateway = Arc::new(gateway);
    info!("Gateway pipeline initialized");

    let upstream = Arc::new(HttpUpstream::new(config.service_urls()));
    let server = GatewayServer::new(addr, gateway, upstream);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate API Gateway stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
