//! Infectmoji headless - websocket-only game server.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Infectmoji headless v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Canvas: {} (entity {})", config.world.canvas_size, config.world.entity_size);
    info!(
        "  Connection limits: {} total, {} per IP",
        config.server.max_connections, config.server.ip_limit
    );

    server::run(config).await?;

    Ok(())
}
