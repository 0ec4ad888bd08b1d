use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use hearth_domain::listing::Listing;

use crate::error::StoreError;

/// Listing read model: the pricing/ownership slice the booking flow needs.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn upsert(&self, listing: &Listing) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Listing>, StoreError>;

    /// Anonymous public read, no tenant scope.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Listing>, StoreError>;
}

pub struct PostgresListingStore {
    pool: PgPool,
}

impl PostgresListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const LISTING_COLUMNS: &str = "id, tenant_id, host_id, title, price_per_night, cleaning_fee, \
     currency, instant_book, cancellation_policy, created_at, updated_at";

fn listing_from_row(row: &PgRow) -> Result<Listing, StoreError> {
    Ok(Listing {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        host_id: row.try_get("host_id")?,
        title: row.try_get("title")?,
        price_per_night: row.try_get("price_per_night")?,
        cleaning_fee: row.try_get("cleaning_fee")?,
        currency: row.try_get("currency")?,
        instant_book: row.try_get("instant_book")?,
        cancellation_policy: row.try_get("cancellation_policy")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ListingStore for PostgresListingStore {
    async fn upsert(&self, listing: &Listing) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO listings (id, tenant_id, host_id, title, price_per_night, cleaning_fee, \
             currency, instant_book, cancellation_policy, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
             host_id = $3, title = $4, price_per_night = $5, cleaning_fee = $6, currency = $7, \
             instant_book = $8, cancellation_policy = $9, updated_at = NOW() \
             WHERE listings.tenant_id = $2",
        )
        .bind(listing.id)
        .bind(&listing.tenant_id)
        .bind(&listing.host_id)
        .bind(&listing.title)
        .bind(listing.price_per_night)
        .bind(listing.cleaning_fee)
        .bind(&listing.currency)
        .bind(listing.instant_book)
        .bind(&listing.cancellation_policy)
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(listing_from_row).transpose()
    }
}

#[derive(Default)]
pub struct MemoryListingStore {
    inner: RwLock<HashMap<Uuid, Listing>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn upsert(&self, listing: &Listing) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        if let Some(existing) = map.get(&listing.id) {
            if existing.tenant_id != listing.tenant_id {
                return Ok(());
            }
        }
        map.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Listing>, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .get(&id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }
}
