use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use hearth_core::ServiceError;
use hearth_domain::booking::BookingStatus;
use hearth_store::TransitionPatch;

use crate::handlers::release_claimed;
use crate::state::AppState;

const SWEEP_BATCH: i64 = 100;

/// Background lifecycle sweep: expired payment-pending bookings fail and give
/// their dates back; confirmed bookings past check-out complete. Both flips
/// are status-guarded, so the sweep races safely with webhooks and reads.
pub fn spawn_lifecycle_sweeper(state: AppState, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(&state).await {
                Ok((0, 0)) => {}
                Ok((failed, completed)) => {
                    info!("sweep: {} expired, {} completed", failed, completed)
                }
                Err(err) => warn!("lifecycle sweep failed: {}", err),
            }
        }
    })
}

pub async fn sweep_once(state: &AppState) -> Result<(usize, usize), ServiceError> {
    let now = Utc::now();

    let mut failed = 0;
    for booking in state.bookings.find_expired(now, SWEEP_BATCH).await? {
        let updated = state
            .bookings
            .transition(
                &booking.tenant_id,
                booking.id,
                &[BookingStatus::PaymentPending],
                BookingStatus::Failed,
                TransitionPatch::default(),
            )
            .await?;
        if let Some(updated) = updated {
            info!("booking {} expired unpaid", updated.id);
            release_claimed(state, &updated).await;
            failed += 1;
        }
    }

    let today = now.date_naive();
    let mut completed = 0;
    for booking in state.bookings.find_elapsed(today, SWEEP_BATCH).await? {
        let updated = state
            .bookings
            .transition(
                &booking.tenant_id,
                booking.id,
                &[BookingStatus::Confirmed],
                BookingStatus::Completed,
                TransitionPatch::default(),
            )
            .await?;
        if updated.is_some() {
            completed += 1;
        }
    }

    Ok((failed, completed))
}
