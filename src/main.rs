//! Roshambo Duel Server
//!
//! Binary entry point: initializes logging, loads configuration from the
//! environment, and runs the WebSocket server.

use tracing::info;
use tracing_subscriber::EnvFilter;

use roshambo::network::server::{GameServer, ServerConfig};
use roshambo::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    info!("Roshambo Server v{}", VERSION);
    info!("Bind address: {}", config.bind_addr);
    info!(
        "Idle session timeout: {}s",
        config.idle_session_timeout.as_secs()
    );

    let server = GameServer::new(config);
    server.run().await?;

    Ok(())
}
