use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use hearth_core::identity::{Principal, SCOPE_BOOKINGS_CREATE, SCOPE_BOOKINGS_MANAGE};
use hearth_core::money::compute_breakdown;
use hearth_core::trust::require_internal;
use hearth_core::ServiceError;
use hearth_domain::booking::{
    approval_window, Booking, BookingStatus, ConfirmBookingRequest, CreateBookingRequest,
    SetCheckoutRequest,
};
use hearth_store::{ClaimOutcome, TransitionPatch};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/bookings", get(list_my_bookings).post(create_booking))
        .route("/bookings/host", get(list_host_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/approve", post(approve_booking))
        .route("/bookings/{id}/reject", post(reject_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/fail", post(fail_booking))
        .route("/bookings/{id}/checkout", put(set_checkout_session))
}

async fn health() -> &'static str {
    "ok"
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| ServiceError::bad_request(format!("invalid body: {e}")))
}

/// Outcome of an internal, idempotent transition: `updated` is false when the
/// status guard did not hold and the row was left untouched.
#[derive(Debug, Serialize)]
struct TransitionOutcome {
    updated: bool,
    booking: Booking,
}

/// POST /bookings
/// Guest creates a booking request. Instant-book listings skip host approval
/// and claim their dates immediately.
async fn create_booking(
    State(state): State<AppState>,
    principal: Principal,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    principal.require_scope(SCOPE_BOOKINGS_CREATE)?;
    let req: CreateBookingRequest = parse_body(&body)?;

    if req.check_out <= req.check_in {
        return Err(ServiceError::bad_request(
            "check-out must be after check-in",
        ));
    }
    if req.guests < 1 {
        return Err(ServiceError::bad_request("guest count must be at least 1"));
    }

    let listing = state
        .listings
        .get_listing(&principal.tenant_id, req.listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("listing not found"))?;

    let nights = (req.check_out - req.check_in).num_days();
    let breakdown = compute_breakdown(
        listing.price_per_night,
        nights,
        listing.cleaning_fee,
        state.platform_fee_percent,
        &listing.currency,
    )?;

    let instant = listing.instant_book
        && state.flags.is_enabled("bookings.instant_book", true).await;

    let now = Utc::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        tenant_id: principal.tenant_id.clone(),
        listing_id: listing.id,
        guest_id: principal.user_id.clone(),
        host_id: listing.host_id.clone(),
        check_in: req.check_in,
        check_out: req.check_out,
        guests: req.guests,
        total_amount: breakdown.total,
        platform_fee: breakdown.platform_fee,
        cleaning_fee: breakdown.cleaning_fee,
        currency: breakdown.currency,
        status: if instant {
            BookingStatus::PaymentPending
        } else {
            BookingStatus::PendingHostApproval
        },
        cancellation_policy: listing.cancellation_policy.clone(),
        message: req.message,
        checkout_session_id: None,
        approved_at: instant.then_some(now),
        expires_at: instant.then_some(now + approval_window()),
        payment_id: None,
        created_at: now,
        updated_at: now,
    };

    if instant {
        match state
            .listings
            .claim_dates(
                &booking.tenant_id,
                booking.listing_id,
                booking.id,
                &booking.stay_dates(),
            )
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::Conflicts(conflicts) => {
                return Err(ServiceError::DateConflict(conflicts))
            }
        }
    }

    if let Err(err) = state.bookings.insert(&booking).await {
        // Dates were claimed but the row never landed; give them back.
        if instant {
            release_claimed(&state, &booking).await;
        }
        return Err(err.into());
    }

    info!(
        "booking {} created in {} for listing {}",
        booking.id, booking.status, booking.listing_id
    );
    state
        .sinks
        .track("booking.created", &booking.tenant_id, booking.id);

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /bookings
async fn list_my_bookings(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Booking>>, ServiceError> {
    let bookings = state
        .bookings
        .list_for_guest(&principal.tenant_id, &principal.user_id)
        .await?;
    Ok(Json(bookings))
}

/// GET /bookings/host
async fn list_host_bookings(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<Booking>>, ServiceError> {
    principal.require_scope(SCOPE_BOOKINGS_MANAGE)?;
    let bookings = state
        .bookings
        .list_for_host(&principal.tenant_id, &principal.user_id)
        .await?;
    Ok(Json(bookings))
}

/// GET /bookings/{id}
/// Public single-booking read: anonymous callers look up by id alone, while
/// a tenant-scoped caller never sees another tenant's booking. Expired
/// payment-pending bookings are failed lazily here.
async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Booking>, ServiceError> {
    let booking = match Principal::from_headers(&headers) {
        Some(principal) => state.bookings.get(&principal.tenant_id, id).await?,
        None => state.bookings.get_by_id(id).await?,
    }
    .ok_or_else(|| ServiceError::not_found("booking not found"))?;

    if booking.is_expired(Utc::now()) {
        if let Some(failed) = state
            .bookings
            .transition(
                &booking.tenant_id,
                id,
                &[BookingStatus::PaymentPending],
                BookingStatus::Failed,
                TransitionPatch::default(),
            )
            .await?
        {
            info!("booking {} expired on read", id);
            release_claimed(&state, &failed).await;
            return Ok(Json(failed));
        }
    }

    Ok(Json(booking))
}

/// POST /bookings/{id}/approve
/// Host approval: claim the stay on the listings service, then flip the
/// status under guard. All-or-nothing; a lost guard releases the claim.
async fn approve_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    principal: Principal,
) -> Result<Json<Booking>, ServiceError> {
    principal.require_scope(SCOPE_BOOKINGS_MANAGE)?;

    let booking = state
        .bookings
        .get(&principal.tenant_id, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("booking not found"))?;

    if booking.host_id != principal.user_id {
        return Err(ServiceError::forbidden("booking belongs to another host"));
    }
    if booking.status != BookingStatus::PendingHostApproval {
        return Err(ServiceError::conflict("invalid transition"));
    }

    match state
        .listings
        .claim_dates(
            &booking.tenant_id,
            booking.listing_id,
            booking.id,
            &booking.stay_dates(),
        )
        .await?
    {
        ClaimOutcome::Claimed => {}
        ClaimOutcome::Conflicts(conflicts) => return Err(ServiceError::DateConflict(conflicts)),
    }

    let approved_at = Utc::now();
    let updated = state
        .bookings
        .transition(
            &principal.tenant_id,
            id,
            &[BookingStatus::PendingHostApproval],
            BookingStatus::PaymentPending,
            TransitionPatch {
                approved_at: Some(approved_at),
                expires_at: Some(approved_at + approval_window()),
                ..Default::default()
            },
        )
        .await?;

    match updated {
        Some(updated) => {
            info!("booking {} approved, payment pending", id);
            state.sinks.notify_booking(
                "booking.approved",
                &updated.tenant_id,
                updated.id,
                &updated.guest_id,
                &updated.host_id,
            );
            Ok(Json(updated))
        }
        None => {
            // Someone else moved the booking between our read and the guarded
            // update; the just-claimed dates must not leak.
            warn!("approval guard lost for booking {}, releasing claim", id);
            release_claimed(&state, &booking).await;
            Err(ServiceError::conflict("invalid transition"))
        }
    }
}

/// POST /bookings/{id}/reject
async fn reject_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    principal: Principal,
) -> Result<Json<Booking>, ServiceError> {
    principal.require_scope(SCOPE_BOOKINGS_MANAGE)?;

    let booking = state
        .bookings
        .get(&principal.tenant_id, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("booking not found"))?;

    if booking.host_id != principal.user_id {
        return Err(ServiceError::forbidden("booking belongs to another host"));
    }

    state
        .bookings
        .transition(
            &principal.tenant_id,
            id,
            &[BookingStatus::PendingHostApproval],
            BookingStatus::Rejected,
            TransitionPatch::default(),
        )
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::conflict("invalid transition"))
}

/// POST /bookings/{id}/cancel
/// Guest or host cancellation. Releasing the claim is unconditional because
/// it is idempotent and the prior state may have changed under us.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    principal: Principal,
) -> Result<Json<Booking>, ServiceError> {
    let booking = state
        .bookings
        .get(&principal.tenant_id, id)
        .await?
        .ok_or_else(|| ServiceError::not_found("booking not found"))?;

    let is_host = principal.user_id == booking.host_id;
    if !is_host && principal.user_id != booking.guest_id {
        return Err(ServiceError::forbidden(
            "only the guest or the host may cancel",
        ));
    }

    let to = if is_host {
        BookingStatus::CancelledByHost
    } else {
        BookingStatus::CancelledByGuest
    };

    let updated = state
        .bookings
        .transition(
            &principal.tenant_id,
            id,
            &BookingStatus::CANCELLABLE,
            to,
            TransitionPatch::default(),
        )
        .await?
        .ok_or_else(|| ServiceError::conflict("invalid transition"))?;

    info!("booking {} cancelled ({})", id, updated.status);
    release_claimed(&state, &updated).await;

    Ok(Json(updated))
}

/// POST /bookings/{id}/confirm  (internal token)
/// Driven by the payment webhook. Guarded on payment_pending; a missed guard
/// is "no change", never an error, so redelivery stays idempotent.
async fn confirm_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransitionOutcome>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;
    let req: ConfirmBookingRequest = parse_body(&body)?;

    let updated = state
        .bookings
        .transition(
            &tenant,
            id,
            &[BookingStatus::PaymentPending],
            BookingStatus::Confirmed,
            TransitionPatch {
                payment_id: Some(req.payment_id),
                ..Default::default()
            },
        )
        .await?;

    match updated {
        Some(booking) => {
            info!("booking {} confirmed via payment webhook", id);
            state.sinks.notify_booking(
                "booking.confirmed",
                &booking.tenant_id,
                booking.id,
                &booking.guest_id,
                &booking.host_id,
            );
            Ok(Json(TransitionOutcome {
                updated: true,
                booking,
            }))
        }
        None => {
            let booking = state
                .bookings
                .get(&tenant, id)
                .await?
                .ok_or_else(|| ServiceError::not_found("booking not found"))?;
            Ok(Json(TransitionOutcome {
                updated: false,
                booking,
            }))
        }
    }
}

/// POST /bookings/{id}/fail  (internal token)
async fn fail_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<TransitionOutcome>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;

    let updated = state
        .bookings
        .transition(
            &tenant,
            id,
            &[BookingStatus::PaymentPending],
            BookingStatus::Failed,
            TransitionPatch::default(),
        )
        .await?;

    match updated {
        Some(booking) => {
            info!("booking {} failed via payment webhook", id);
            release_claimed(&state, &booking).await;
            Ok(Json(TransitionOutcome {
                updated: true,
                booking,
            }))
        }
        None => {
            let booking = state
                .bookings
                .get(&tenant, id)
                .await?
                .ok_or_else(|| ServiceError::not_found("booking not found"))?;
            Ok(Json(TransitionOutcome {
                updated: false,
                booking,
            }))
        }
    }
}

/// PUT /bookings/{id}/checkout  (internal token)
/// Persist the external checkout-session id before the guest is redirected.
async fn set_checkout_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TransitionOutcome>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;
    let req: SetCheckoutRequest = parse_body(&body)?;

    let updated = state
        .bookings
        .transition(
            &tenant,
            id,
            &[BookingStatus::PaymentPending],
            BookingStatus::PaymentPending,
            TransitionPatch {
                checkout_session_id: Some(req.checkout_session_id),
                ..Default::default()
            },
        )
        .await?;

    match updated {
        Some(booking) => Ok(Json(TransitionOutcome {
            updated: true,
            booking,
        })),
        None => {
            let booking = state
                .bookings
                .get(&tenant, id)
                .await?
                .ok_or_else(|| ServiceError::not_found("booking not found"))?;
            Ok(Json(TransitionOutcome {
                updated: false,
                booking,
            }))
        }
    }
}

/// Give a booking's claimed dates back to the listing. Failures are logged,
/// not surfaced; the release is idempotent.
pub(crate) async fn release_claimed(state: &AppState, booking: &Booking) {
    if let Err(err) = state
        .listings
        .release_dates(&booking.tenant_id, booking.listing_id, booking.id)
        .await
    {
        warn!("failed to release dates for booking {}: {}", booking.id, err);
    }
}
