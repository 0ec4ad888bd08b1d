use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use hearth_core::identity::{Principal, SCOPE_BOOKINGS_MANAGE, TENANT_ID_HEADER};
use hearth_core::trust::require_internal;
use hearth_core::ServiceError;
use hearth_domain::availability::{
    date_range, BlockDatesRequest, BookDatesRequest, ConflictsResponse,
};
use hearth_domain::listing::{Listing, UpsertListingRequest};
use hearth_store::ClaimOutcome;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/listings/{id}", get(get_listing).put(upsert_listing))
        .route("/listings/{id}/availability", get(check_availability))
        .route(
            "/listings/{id}/availability/book",
            post(book_dates).delete(release_dates),
        )
        .route("/listings/{id}/availability/block", post(block_dates))
        .route("/listings/{id}/availability/unblock", post(unblock_dates))
}

async fn health() -> &'static str {
    "ok"
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| ServiceError::bad_request(format!("invalid body: {e}")))
}

fn header_tenant(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

/// GET /listings/{id}
/// Public read. A tenant-scoped caller only sees its own tenant's listings.
async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Listing>, ServiceError> {
    let listing = match header_tenant(&headers) {
        Some(tenant) => state.listings.get(&tenant, id).await?,
        None => state.listings.get_by_id(id).await?,
    };

    listing
        .map(Json)
        .ok_or_else(|| ServiceError::not_found("listing not found"))
}

/// PUT /listings/{id}
/// Internal upsert of the read model.
async fn upsert_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Listing>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;
    let req: UpsertListingRequest = parse_body(&body)?;

    let now = Utc::now();
    let listing = Listing {
        id,
        tenant_id: tenant,
        host_id: req.host_id,
        title: req.title,
        price_per_night: req.price_per_night,
        cleaning_fee: req.cleaning_fee,
        currency: req.currency,
        instant_book: req.instant_book,
        cancellation_policy: req.cancellation_policy,
        created_at: now,
        updated_at: now,
    };
    state.listings.upsert(&listing).await?;

    Ok(Json(listing))
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    from: NaiveDate,
    to: NaiveDate,
}

/// GET /listings/{id}/availability?from=&to=
/// Read-only conflict probe over a date range.
async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
    headers: HeaderMap,
) -> Result<Json<ConflictsResponse>, ServiceError> {
    if query.to <= query.from {
        return Err(ServiceError::bad_request("to must be after from"));
    }

    let listing = match header_tenant(&headers) {
        Some(tenant) => state.listings.get(&tenant, id).await?,
        None => state.listings.get_by_id(id).await?,
    }
    .ok_or_else(|| ServiceError::not_found("listing not found"))?;

    let dates = date_range(query.from, query.to);
    let conflicts = state
        .availability
        .conflicts(&listing.tenant_id, id, &dates)
        .await?;

    Ok(Json(ConflictsResponse { conflicts }))
}

/// POST /listings/{id}/availability/book
/// Internal atomic claim of a contiguous stay for one booking.
async fn book_dates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;
    let req: BookDatesRequest = parse_body(&body)?;
    if req.dates.is_empty() {
        return Err(ServiceError::bad_request("dates must not be empty"));
    }

    match state
        .availability
        .claim(&tenant, id, req.booking_id, &req.dates)
        .await?
    {
        ClaimOutcome::Claimed => {
            info!(
                "booked {} dates on listing {} for booking {}",
                req.dates.len(),
                id,
                req.booking_id
            );
            Ok(Json(json!({ "status": "booked" })))
        }
        ClaimOutcome::Conflicts(conflicts) => Err(ServiceError::DateConflict(conflicts)),
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseQuery {
    booking_id: Uuid,
}

/// DELETE /listings/{id}/availability/book?booking_id=
/// Internal release of every date owned by the booking. Idempotent.
async fn release_dates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReleaseQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let tenant = require_internal(&headers, &state.internal_token)?;
    let released = state
        .availability
        .release(&tenant, id, query.booking_id)
        .await?;

    Ok(Json(json!({ "released": released })))
}

/// POST /listings/{id}/availability/block
/// Host marks dates unavailable. Booked rows are untouchable.
async fn block_dates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    principal: Principal,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let listing = authorize_host(&state, &principal, id).await?;
    let req: BlockDatesRequest = parse_body(&body)?;

    match state
        .availability
        .block(&listing.tenant_id, id, &req.dates)
        .await?
    {
        ClaimOutcome::Claimed => Ok(Json(json!({ "status": "blocked" }))),
        ClaimOutcome::Conflicts(conflicts) => Err(ServiceError::DateConflict(conflicts)),
    }
}

/// POST /listings/{id}/availability/unblock
async fn unblock_dates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    principal: Principal,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let listing = authorize_host(&state, &principal, id).await?;
    let req: BlockDatesRequest = parse_body(&body)?;

    let released = state
        .availability
        .unblock(&listing.tenant_id, id, &req.dates)
        .await?;

    Ok(Json(json!({ "unblocked": released })))
}

async fn authorize_host(
    state: &AppState,
    principal: &Principal,
    listing_id: Uuid,
) -> Result<Listing, ServiceError> {
    principal.require_scope(SCOPE_BOOKINGS_MANAGE)?;

    let listing = state
        .listings
        .get(&principal.tenant_id, listing_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("listing not found"))?;

    if listing.host_id != principal.user_id {
        return Err(ServiceError::forbidden("listing belongs to another host"));
    }

    Ok(listing)
}
