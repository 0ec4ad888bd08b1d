use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_payments::bookings_client::HttpBookingsClient;
use hearth_payments::config::PaymentsConfig;
use hearth_payments::{app, AppState};
use hearth_store::dedup::spawn_purge_sweeper;
use hearth_store::{DbClient, DedupStore, MemoryDedupStore, PostgresDedupStore};

const DEDUP_RETENTION_HOURS: i64 = 48;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = PaymentsConfig::from_env()?;

    let dedup: Arc<dyn DedupStore> = match &config.database_url {
        Some(url) => {
            let db = DbClient::connect(url)
                .await
                .context("failed to connect to database")?;
            db.ping().await.context("database ping failed")?;
            db.migrate().await.context("database migration failed")?;
            info!("using persistent webhook dedup");
            Arc::new(PostgresDedupStore::new(db.pool.clone()))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory webhook dedup");
            Arc::new(MemoryDedupStore::new())
        }
    };

    spawn_purge_sweeper(
        dedup.clone(),
        Duration::from_secs(3600),
        chrono::Duration::hours(DEDUP_RETENTION_HOURS),
    );

    let bookings = HttpBookingsClient::new(
        config.bookings_url.clone(),
        config.internal_token.clone(),
    )
    .context("failed to build bookings client")?;

    let state = AppState {
        bookings: Arc::new(bookings),
        dedup,
        webhook_secret: config.webhook_secret.clone(),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("payments service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
