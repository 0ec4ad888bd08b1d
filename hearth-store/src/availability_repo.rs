use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use hearth_domain::availability::DayStatus;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Conflicts(Vec<NaiveDate>),
}

/// Day-grained reservation calendar, owned by the listings service. The
/// unique `(tenant_id, listing_id, date)` key is the serialisation point for
/// bookings contesting the same nights; callers always see dates sorted
/// ascending so lock acquisition stays monotone.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// All-or-nothing claim of `dates` for `booking_id`. Returns the
    /// conflicting dates when any of them is already booked or blocked.
    async fn claim(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError>;

    /// Delete every booked row owned by `booking_id`. Idempotent.
    async fn release(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Host-driven block. Cannot touch booked rows; those come back as
    /// conflicts.
    async fn block(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError>;

    /// Remove host blocks. Booked rows are untouched.
    async fn unblock(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<u64, StoreError>;

    /// Read-only conflict probe over a candidate date set.
    async fn conflicts(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StoreError>;
}

fn sorted_dates(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

// ============================================================================
// Postgres implementation
// ============================================================================

pub struct PostgresAvailabilityStore {
    pool: PgPool,
}

impl PostgresAvailabilityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvailabilityStore for PostgresAvailabilityStore {
    async fn claim(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError> {
        let dates = sorted_dates(dates);
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT date FROM availability_days \
             WHERE tenant_id = $1 AND listing_id = $2 AND date = ANY($3) \
             AND status IN ('booked', 'blocked') ORDER BY date",
        )
        .bind(tenant_id)
        .bind(listing_id)
        .bind(&dates)
        .fetch_all(&mut *tx)
        .await?;

        if !rows.is_empty() {
            tx.rollback().await?;
            let conflicts = rows
                .iter()
                .map(|r| r.try_get("date"))
                .collect::<Result<Vec<NaiveDate>, _>>()?;
            return Ok(ClaimOutcome::Conflicts(conflicts));
        }

        // The unique key is the serialisation point: a racing claim that got
        // here first makes our insert a no-op, which we treat as a conflict.
        for date in &dates {
            let result = sqlx::query(
                "INSERT INTO availability_days (tenant_id, listing_id, date, status, booking_id) \
                 VALUES ($1, $2, $3, 'booked', $4) \
                 ON CONFLICT (tenant_id, listing_id, date) DO UPDATE \
                 SET status = 'booked', booking_id = $4 \
                 WHERE availability_days.status = 'available'",
            )
            .bind(tenant_id)
            .bind(listing_id)
            .bind(date)
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(ClaimOutcome::Conflicts(vec![*date]));
            }
        }

        tx.commit().await?;
        Ok(ClaimOutcome::Claimed)
    }

    async fn release(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM availability_days \
             WHERE tenant_id = $1 AND listing_id = $2 AND booking_id = $3 AND status = 'booked'",
        )
        .bind(tenant_id)
        .bind(listing_id)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn block(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError> {
        let dates = sorted_dates(dates);
        let mut tx = self.pool.begin().await?;
        let mut conflicts = Vec::new();

        for date in &dates {
            let result = sqlx::query(
                "INSERT INTO availability_days (tenant_id, listing_id, date, status) \
                 VALUES ($1, $2, $3, 'blocked') \
                 ON CONFLICT (tenant_id, listing_id, date) DO UPDATE SET status = 'blocked' \
                 WHERE availability_days.status <> 'booked'",
            )
            .bind(tenant_id)
            .bind(listing_id)
            .bind(date)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                conflicts.push(*date);
            }
        }

        if conflicts.is_empty() {
            tx.commit().await?;
            Ok(ClaimOutcome::Claimed)
        } else {
            tx.rollback().await?;
            Ok(ClaimOutcome::Conflicts(conflicts))
        }
    }

    async fn unblock(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<u64, StoreError> {
        let dates = sorted_dates(dates);
        let result = sqlx::query(
            "DELETE FROM availability_days \
             WHERE tenant_id = $1 AND listing_id = $2 AND date = ANY($3) AND status = 'blocked'",
        )
        .bind(tenant_id)
        .bind(listing_id)
        .bind(&dates)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn conflicts(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let dates = sorted_dates(dates);
        let rows = sqlx::query(
            "SELECT date FROM availability_days \
             WHERE tenant_id = $1 AND listing_id = $2 AND date = ANY($3) \
             AND status IN ('booked', 'blocked') ORDER BY date",
        )
        .bind(tenant_id)
        .bind(listing_id)
        .bind(&dates)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get("date").map_err(StoreError::from))
            .collect()
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryDay {
    status: DayStatus,
    booking_id: Option<Uuid>,
}

type DayKey = (String, Uuid, NaiveDate);

#[derive(Default)]
pub struct MemoryAvailabilityStore {
    inner: RwLock<HashMap<DayKey, MemoryDay>>,
}

impl MemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn claim(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError> {
        let dates = sorted_dates(dates);
        // Single write guard makes the whole check-then-insert atomic.
        let mut map = self.inner.write().await;

        let conflicts: Vec<NaiveDate> = dates
            .iter()
            .filter(|date| {
                map.get(&(tenant_id.to_owned(), listing_id, **date))
                    .is_some_and(|d| d.status != DayStatus::Available)
            })
            .copied()
            .collect();
        if !conflicts.is_empty() {
            return Ok(ClaimOutcome::Conflicts(conflicts));
        }

        for date in dates {
            map.insert(
                (tenant_id.to_owned(), listing_id, date),
                MemoryDay {
                    status: DayStatus::Booked,
                    booking_id: Some(booking_id),
                },
            );
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn release(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|(tenant, listing, _), day| {
            !(tenant == tenant_id
                && *listing == listing_id
                && day.status == DayStatus::Booked
                && day.booking_id == Some(booking_id))
        });
        Ok((before - map.len()) as u64)
    }

    async fn block(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, StoreError> {
        let dates = sorted_dates(dates);
        let mut map = self.inner.write().await;

        let conflicts: Vec<NaiveDate> = dates
            .iter()
            .filter(|date| {
                map.get(&(tenant_id.to_owned(), listing_id, **date))
                    .is_some_and(|d| d.status == DayStatus::Booked)
            })
            .copied()
            .collect();
        if !conflicts.is_empty() {
            return Ok(ClaimOutcome::Conflicts(conflicts));
        }

        for date in dates {
            map.insert(
                (tenant_id.to_owned(), listing_id, date),
                MemoryDay {
                    status: DayStatus::Blocked,
                    booking_id: None,
                },
            );
        }
        Ok(ClaimOutcome::Claimed)
    }

    async fn unblock(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<u64, StoreError> {
        let dates = sorted_dates(dates);
        let mut map = self.inner.write().await;
        let mut removed = 0;
        for date in dates {
            let key = (tenant_id.to_owned(), listing_id, date);
            if map
                .get(&key)
                .is_some_and(|d| d.status == DayStatus::Blocked)
            {
                map.remove(&key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn conflicts(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let dates = sorted_dates(dates);
        let map = self.inner.read().await;
        Ok(dates
            .into_iter()
            .filter(|date| {
                map.get(&(tenant_id.to_owned(), listing_id, *date))
                    .is_some_and(|d| d.status != DayStatus::Available)
            })
            .collect())
    }
}
