//! API gateway binary.
//!
//! Loads the TOML configuration given as the first argument (defaults when
//! omitted), binds the listener, and serves until interrupted.

use std::path::PathBuf;

use tokio::net::TcpListener;

use api_gateway::config::{load_config, GatewayConfig};
use api_gateway::observability::logging;
use api_gateway::GatewayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&PathBuf::from(path))?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        routes = config.routes.len(),
        "configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "listening for connections");

    let server = GatewayServer::new(config)?;
    server.run(listener).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
