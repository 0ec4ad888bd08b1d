use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use tokio::time::MissedTickBehavior;

use crate::error::StoreError;

/// Durable record of processed webhook event ids. The check-and-record is a
/// single atomic insert-if-absent; entries are retained for at least 48 hours
/// and purged by a background sweeper.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Returns `true` on first sighting of the event id.
    async fn insert_if_absent(&self, event_id: &str) -> Result<bool, StoreError>;

    /// Roll back an admission whose downstream processing failed, so the
    /// gateway's retry is processed rather than skipped.
    async fn remove(&self, event_id: &str) -> Result<(), StoreError>;

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub struct PostgresDedupStore {
    pool: PgPool,
}

impl PostgresDedupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for PostgresDedupStore {
    async fn insert_if_absent(&self, event_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (event_id, received_at) VALUES ($1, NOW()) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, event_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM webhook_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Fallback for deployments without a DATABASE_URL. Per-key atomicity comes
/// from the concurrent map's entry API.
#[derive(Default)]
pub struct MemoryDedupStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn insert_if_absent(&self, event_id: &str) -> Result<bool, StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(event_id.to_owned()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Ok(true)
            }
        }
    }

    async fn remove(&self, event_id: &str) -> Result<(), StoreError> {
        self.entries.remove(event_id);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, seen_at| *seen_at >= cutoff);
        Ok((before - self.entries.len()) as u64)
    }
}

/// Periodic retention sweep; runs at least hourly in production wiring.
pub fn spawn_purge_sweeper(
    store: Arc<dyn DedupStore>,
    period: Duration,
    retention: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - retention;
            match store.purge_older_than(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!("purged {} webhook dedup records", purged),
                Err(err) => tracing::warn!("dedup purge failed: {}", err),
            }
        }
    })
}
