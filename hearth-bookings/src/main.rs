use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_bookings::config::BookingsConfig;
use hearth_bookings::flags::FlagsCache;
use hearth_bookings::listings_client::HttpListingsClient;
use hearth_bookings::sinks::SideChannels;
use hearth_bookings::sweeper::spawn_lifecycle_sweeper;
use hearth_bookings::{app, AppState};
use hearth_store::{DbClient, PostgresBookingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = BookingsConfig::from_env()?;

    let db = DbClient::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    db.ping().await.context("database ping failed")?;
    db.migrate().await.context("database migration failed")?;

    let listings = HttpListingsClient::new(
        config.listings_url.clone(),
        config.internal_token.clone(),
    )
    .context("failed to build listings client")?;

    let state = AppState {
        bookings: Arc::new(PostgresBookingStore::new(db.pool.clone())),
        listings: Arc::new(listings),
        sinks: SideChannels::new(
            config.notify_url.clone(),
            config.notify_api_key.clone(),
            config.analytics_url.clone(),
            config.analytics_api_key.clone(),
        ),
        flags: FlagsCache::new(config.flags_url.clone(), config.flags_api_key.clone()),
        internal_token: config.internal_token.clone(),
        platform_fee_percent: config.platform_fee_percent,
    };

    spawn_lifecycle_sweeper(state.clone(), Duration::from_secs(60));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("bookings service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
