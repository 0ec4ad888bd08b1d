use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use hearth_domain::booking::{Booking, BookingStatus};

use crate::error::StoreError;

/// Optional columns a guarded transition may set alongside the status flip.
#[derive(Debug, Default, Clone)]
pub struct TransitionPatch {
    pub approved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payment_id: Option<String>,
    pub checkout_session_id: Option<String>,
}

/// Booking persistence. Every mutation after insert is a status-guarded
/// update: the guard travels inside the UPDATE predicate, so optimistic
/// concurrency needs no row locks.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Tenant-scoped lookup; a cross-tenant id is a miss, not an error.
    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Anonymous single-booking read (the id is the capability).
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn list_for_guest(
        &self,
        tenant_id: &str,
        guest_id: &str,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn list_for_host(
        &self,
        tenant_id: &str,
        host_id: &str,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Flip the status iff the current status is one of `expected`, applying
    /// the patch in the same statement. Returns the updated row, or `None`
    /// when the guard did not hold.
    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        expected: &[BookingStatus],
        to: BookingStatus,
        patch: TransitionPatch,
    ) -> Result<Option<Booking>, StoreError>;

    /// `payment_pending` bookings whose expiry deadline has passed.
    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError>;

    /// `confirmed` bookings whose check-out date has passed.
    async fn find_elapsed(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError>;
}

// ============================================================================
// Postgres implementation
// ============================================================================

pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, tenant_id, listing_id, guest_id, host_id, check_in, check_out, \
     guests, total_amount, platform_fee, cleaning_fee, currency, status, cancellation_policy, \
     message, checkout_session_id, approved_at, expires_at, payment_id, created_at, updated_at";

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Booking {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        listing_id: row.try_get("listing_id")?,
        guest_id: row.try_get("guest_id")?,
        host_id: row.try_get("host_id")?,
        check_in: row.try_get("check_in")?,
        check_out: row.try_get("check_out")?,
        guests: row.try_get("guests")?,
        total_amount: row.try_get("total_amount")?,
        platform_fee: row.try_get("platform_fee")?,
        cleaning_fee: row.try_get("cleaning_fee")?,
        currency: row.try_get("currency")?,
        status: status.parse().map_err(StoreError::Corrupt)?,
        cancellation_policy: row.try_get("cancellation_policy")?,
        message: row.try_get("message")?,
        checkout_session_id: row.try_get("checkout_session_id")?,
        approved_at: row.try_get("approved_at")?,
        expires_at: row.try_get("expires_at")?,
        payment_id: row.try_get("payment_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn status_strings(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_owned()).collect()
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO bookings (id, tenant_id, listing_id, guest_id, host_id, check_in, \
             check_out, guests, total_amount, platform_fee, cleaning_fee, currency, status, \
             cancellation_policy, message, checkout_session_id, approved_at, expires_at, \
             payment_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21)",
        )
        .bind(booking.id)
        .bind(&booking.tenant_id)
        .bind(booking.listing_id)
        .bind(&booking.guest_id)
        .bind(&booking.host_id)
        .bind(booking.check_in)
        .bind(booking.check_out)
        .bind(booking.guests)
        .bind(booking.total_amount)
        .bind(booking.platform_fee)
        .bind(booking.cleaning_fee)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(&booking.cancellation_policy)
        .bind(&booking.message)
        .bind(&booking.checkout_session_id)
        .bind(booking.approved_at)
        .bind(booking.expires_at)
        .bind(&booking.payment_id)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn list_for_guest(
        &self,
        tenant_id: &str,
        guest_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE tenant_id = $1 AND guest_id = $2 ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .bind(guest_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn list_for_host(
        &self,
        tenant_id: &str,
        host_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE tenant_id = $1 AND host_id = $2 ORDER BY created_at DESC"
        ))
        .bind(tenant_id)
        .bind(host_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        expected: &[BookingStatus],
        to: BookingStatus,
        patch: TransitionPatch,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE bookings SET status = $1, \
             approved_at = COALESCE($2, approved_at), \
             expires_at = COALESCE($3, expires_at), \
             payment_id = COALESCE($4, payment_id), \
             checkout_session_id = COALESCE($5, checkout_session_id), \
             updated_at = NOW() \
             WHERE tenant_id = $6 AND id = $7 AND status = ANY($8) \
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(to.as_str())
        .bind(patch.approved_at)
        .bind(patch.expires_at)
        .bind(&patch.payment_id)
        .bind(&patch.checkout_session_id)
        .bind(tenant_id)
        .bind(id)
        .bind(status_strings(expected))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(booking_from_row).transpose()
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'payment_pending' AND expires_at IS NOT NULL AND expires_at < $1 \
             ORDER BY expires_at LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }

    async fn find_elapsed(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'confirmed' AND check_out <= $1 \
             ORDER BY check_out LIMIT $2"
        ))
        .bind(today)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(booking_from_row).collect()
    }
}

// ============================================================================
// In-memory implementation (tests, DATABASE_URL-less development)
// ============================================================================

#[derive(Default)]
pub struct MemoryBookingStore {
    inner: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&booking.id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate booking id {}",
                booking.id
            )));
        }
        map.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let map = self.inner.read().await;
        Ok(map
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn list_for_guest(
        &self,
        tenant_id: &str,
        guest_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let map = self.inner.read().await;
        let mut bookings: Vec<Booking> = map
            .values()
            .filter(|b| b.tenant_id == tenant_id && b.guest_id == guest_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn list_for_host(
        &self,
        tenant_id: &str,
        host_id: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let map = self.inner.read().await;
        let mut bookings: Vec<Booking> = map
            .values()
            .filter(|b| b.tenant_id == tenant_id && b.host_id == host_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        expected: &[BookingStatus],
        to: BookingStatus,
        patch: TransitionPatch,
    ) -> Result<Option<Booking>, StoreError> {
        let mut map = self.inner.write().await;
        let Some(booking) = map.get_mut(&id) else {
            return Ok(None);
        };
        if booking.tenant_id != tenant_id || !expected.contains(&booking.status) {
            return Ok(None);
        }

        booking.status = to;
        if patch.approved_at.is_some() {
            booking.approved_at = patch.approved_at;
        }
        if patch.expires_at.is_some() {
            booking.expires_at = patch.expires_at;
        }
        if patch.payment_id.is_some() {
            booking.payment_id = patch.payment_id;
        }
        if patch.checkout_session_id.is_some() {
            booking.checkout_session_id = patch.checkout_session_id;
        }
        booking.updated_at = Utc::now();

        Ok(Some(booking.clone()))
    }

    async fn find_expired(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let map = self.inner.read().await;
        let mut expired: Vec<Booking> = map
            .values()
            .filter(|b| b.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|b| b.expires_at);
        expired.truncate(limit as usize);
        Ok(expired)
    }

    async fn find_elapsed(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Booking>, StoreError> {
        let map = self.inner.read().await;
        let mut elapsed: Vec<Booking> = map
            .values()
            .filter(|b| b.status == BookingStatus::Confirmed && b.check_out <= today)
            .cloned()
            .collect();
        elapsed.sort_by_key(|b| b.check_out);
        elapsed.truncate(limit as usize);
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn booking(tenant: &str, status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            tenant_id: tenant.into(),
            listing_id: Uuid::new_v4(),
            guest_id: "guest-1".into(),
            host_id: "host-1".into(),
            check_in: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
            guests: 2,
            total_amount: Decimal::new(25000, 2),
            platform_fee: Decimal::new(2000, 2),
            cleaning_fee: Decimal::new(3000, 2),
            currency: "USD".into(),
            status,
            cancellation_policy: "moderate".into(),
            message: None,
            checkout_session_id: None,
            approved_at: None,
            expires_at: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn transition_applies_guard_and_patch() {
        let store = MemoryBookingStore::new();
        let b = booking("t-1", BookingStatus::PendingHostApproval);
        store.insert(&b).await.unwrap();

        let approved_at = Utc::now();
        let updated = store
            .transition(
                "t-1",
                b.id,
                &[BookingStatus::PendingHostApproval],
                BookingStatus::PaymentPending,
                TransitionPatch {
                    approved_at: Some(approved_at),
                    expires_at: Some(approved_at + Duration::hours(24)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, BookingStatus::PaymentPending);
        assert_eq!(updated.approved_at, Some(approved_at));

        // Guard no longer holds: second approval attempt is a no-op.
        let again = store
            .transition(
                "t-1",
                b.id,
                &[BookingStatus::PendingHostApproval],
                BookingStatus::PaymentPending,
                TransitionPatch::default(),
            )
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn transition_is_tenant_scoped() {
        let store = MemoryBookingStore::new();
        let b = booking("t-1", BookingStatus::PaymentPending);
        store.insert(&b).await.unwrap();

        let cross = store
            .transition(
                "t-2",
                b.id,
                &[BookingStatus::PaymentPending],
                BookingStatus::Confirmed,
                TransitionPatch::default(),
            )
            .await
            .unwrap();
        assert!(cross.is_none());
        assert!(store.get("t-2", b.id).await.unwrap().is_none());
        assert_eq!(
            store.get("t-1", b.id).await.unwrap().unwrap().status,
            BookingStatus::PaymentPending
        );
    }

    #[tokio::test]
    async fn expired_scan_only_sees_overdue_payment_pending() {
        let store = MemoryBookingStore::new();
        let now = Utc::now();

        let mut overdue = booking("t-1", BookingStatus::PaymentPending);
        overdue.expires_at = Some(now - Duration::seconds(5));
        store.insert(&overdue).await.unwrap();

        let mut fresh = booking("t-1", BookingStatus::PaymentPending);
        fresh.expires_at = Some(now + Duration::hours(12));
        store.insert(&fresh).await.unwrap();

        let mut done = booking("t-1", BookingStatus::Confirmed);
        done.expires_at = Some(now - Duration::hours(2));
        store.insert(&done).await.unwrap();

        let expired = store.find_expired(now, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, overdue.id);
    }
}
