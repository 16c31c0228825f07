//! Sessionward - expired session sweeper

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessionward::{
    config::Config,
    db::{self, repositories::SqlxSessionRepository},
    services::SessionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessionward=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting session sweeper...");

    // Load configuration
    let config = Config::load_with_env(Path::new("sessionward.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    pool.ping().await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let store = SessionStore::from_config(SqlxSessionRepository::boxed(pool.clone()), &config.sessions);

    let period = std::time::Duration::from_secs(config.sessions.clean_interval_seconds);
    let mut interval = tokio::time::interval(period);
    tracing::info!(
        "Removing expired sessions every {}s",
        config.sessions.clean_interval_seconds
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = store.clean_expired().await {
                    tracing::warn!("Session sweep failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    pool.close().await;
    Ok(())
}
