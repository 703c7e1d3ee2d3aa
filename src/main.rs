mod api;
mod config;
mod models;
mod services;
mod sources;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use services::PoolStatsService;

#[tokio::main(worker_threads = 4)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,pool_stats_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    api::tls::install_crypto_provider();

    let config = Config::load()?;
    tracing::info!(
        "✓ Configuration loaded (source {}, {} routes)",
        config.source.base_url,
        config.routes.len()
    );

    let mut service = PoolStatsService::new(config)?;
    service.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    service.stop().await;

    Ok(())
}
