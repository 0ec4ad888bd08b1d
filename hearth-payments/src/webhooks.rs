use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use hearth_core::ServiceError;
use hearth_domain::webhook::{
    WebhookEvent, EVENT_CHECKOUT_SESSION_CREATED, EVENT_PAYMENT_CAPTURED, EVENT_PAYMENT_FAILED,
};

use crate::signature::{verify_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/mashgate", post(handle_mashgate_webhook))
}

async fn health() -> &'static str {
    "ok"
}

/// POST /webhooks/mashgate
///
/// Pipeline: raw body -> signature -> parse -> dedup -> dispatch. The
/// dedup admission is atomic; a duplicate returns 200 immediately so the
/// gateway stops retrying. A downstream failure rolls the admission back and
/// returns 5xx so the retry is processed rather than skipped.
async fn handle_mashgate_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok());
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return unauthorized("missing signature headers");
    };

    if let Err(err) = verify_signature(
        &state.webhook_secret,
        timestamp,
        signature,
        &body,
        Utc::now().timestamp_millis(),
    ) {
        warn!("webhook signature rejected: {}", err);
        return unauthorized("invalid signature");
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            return ServiceError::bad_request(format!("invalid webhook body: {err}"))
                .into_response()
        }
    };

    let first_sighting = match state.dedup.insert_if_absent(&event.event_id).await {
        Ok(first) => first,
        Err(err) => return ServiceError::from(err).into_response(),
    };
    if !first_sighting {
        info!("webhook {} already processed, skipping", event.event_id);
        return Json(json!({ "status": "ok", "dedup": "skipped" })).into_response();
    }

    match dispatch(&state, &event).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(err) => {
            // The event was admitted but not applied; reopen it for the retry.
            if let Err(remove_err) = state.dedup.remove(&event.event_id).await {
                warn!(
                    "failed to reopen dedup record {}: {}",
                    event.event_id, remove_err
                );
            }
            err.into_response()
        }
    }
}

async fn dispatch(state: &AppState, event: &WebhookEvent) -> Result<(), ServiceError> {
    let data = &event.data;
    match event.event_type.as_str() {
        EVENT_PAYMENT_CAPTURED => {
            let payment_id = data
                .payment_id
                .as_deref()
                .ok_or_else(|| ServiceError::bad_request("payment.captured without payment_id"))?;
            state
                .bookings
                .confirm(&data.tenant_id, data.booking_id, payment_id)
                .await?;
            info!(
                "payment captured for booking {} (event {})",
                data.booking_id, event.event_id
            );
            Ok(())
        }
        EVENT_PAYMENT_FAILED => {
            state.bookings.fail(&data.tenant_id, data.booking_id).await?;
            info!(
                "payment failed for booking {} (event {})",
                data.booking_id, event.event_id
            );
            Ok(())
        }
        EVENT_CHECKOUT_SESSION_CREATED => {
            let session = data.checkout_session_id.as_deref().ok_or_else(|| {
                ServiceError::bad_request("checkout.session.created without session id")
            })?;
            state
                .bookings
                .set_checkout(&data.tenant_id, data.booking_id, session)
                .await?;
            Ok(())
        }
        other => {
            // Unknown types are acknowledged so the gateway stops retrying.
            info!("ignoring webhook type {}", other);
            Ok(())
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response()
}
