//! Trivia Duel Server
//!
//! Lobby and session server for two-player trivia duels.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use trivia_duel::{
    network::{GameServer, ServerConfig},
    VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_LOG_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_LOG_FILTER: &str = "info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Trivia Duel Server v{}", VERSION);

    let config = ServerConfig::from_env();
    info!("Bind address: {}", config.bind_addr);
    info!("Max connections: {}", config.max_connections);
    info!(
        "Reaper: every {}s, max session age {}s",
        config.reaper.interval.as_secs(),
        config.reaper.max_age.as_secs()
    );

    let server = Arc::new(GameServer::new(config));
    let mut runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = &mut runner => {
            result??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Ctrl-C received, shutting down");
            server.shutdown();
        }
    }

    runner.await??;
    info!("Server stopped");
    Ok(())
}
