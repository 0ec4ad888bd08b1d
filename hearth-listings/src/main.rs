use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_listings::config::ListingsConfig;
use hearth_listings::{app, AppState};
use hearth_store::{DbClient, PostgresAvailabilityStore, PostgresListingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ListingsConfig::from_env()?;

    let db = DbClient::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    db.ping().await.context("database ping failed")?;
    db.migrate().await.context("database migration failed")?;

    let state = AppState {
        listings: Arc::new(PostgresListingStore::new(db.pool.clone())),
        availability: Arc::new(PostgresAvailabilityStore::new(db.pool.clone())),
        internal_token: config.internal_token.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listings service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
