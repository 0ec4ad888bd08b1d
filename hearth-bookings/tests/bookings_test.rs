use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use hearth_bookings::flags::FlagsCache;
use hearth_bookings::listings_client::ListingsClient;
use hearth_bookings::sinks::SideChannels;
use hearth_bookings::sweeper::sweep_once;
use hearth_bookings::{app, AppState};
use hearth_core::identity::{
    INTERNAL_TOKEN_HEADER, TENANT_ID_HEADER, USER_ID_HEADER, USER_SCOPES_HEADER,
};
use hearth_core::ServiceError;
use hearth_domain::booking::BookingStatus;
use hearth_domain::listing::Listing;
use hearth_store::{
    AvailabilityStore, BookingStore, ClaimOutcome, ListingStore, MemoryAvailabilityStore,
    MemoryBookingStore, MemoryListingStore, TransitionPatch,
};

const INTERNAL_TOKEN: &str = "test-internal-token";

/// In-process stand-in for the listings service, backed by the same stores
/// the real service uses.
struct LocalListings {
    listings: Arc<MemoryListingStore>,
    availability: Arc<MemoryAvailabilityStore>,
}

#[async_trait]
impl ListingsClient for LocalListings {
    async fn get_listing(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
    ) -> Result<Option<Listing>, ServiceError> {
        Ok(self.listings.get(tenant_id, listing_id).await?)
    }

    async fn claim_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, ServiceError> {
        Ok(self
            .availability
            .claim(tenant_id, listing_id, booking_id, dates)
            .await?)
    }

    async fn release_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.availability
            .release(tenant_id, listing_id, booking_id)
            .await?;
        Ok(())
    }
}

struct TestEnv {
    state: AppState,
    bookings: Arc<MemoryBookingStore>,
    listings: Arc<MemoryListingStore>,
    availability: Arc<MemoryAvailabilityStore>,
}

fn test_env() -> TestEnv {
    let bookings = Arc::new(MemoryBookingStore::new());
    let listings = Arc::new(MemoryListingStore::new());
    let availability = Arc::new(MemoryAvailabilityStore::new());

    let state = AppState {
        bookings: bookings.clone(),
        listings: Arc::new(LocalListings {
            listings: listings.clone(),
            availability: availability.clone(),
        }),
        sinks: SideChannels::disabled(),
        flags: FlagsCache::disabled(),
        internal_token: INTERNAL_TOKEN.to_owned(),
        platform_fee_percent: Decimal::from(10),
    };

    TestEnv {
        state,
        bookings,
        listings,
        availability,
    }
}

async fn seed_listing(env: &TestEnv, tenant: &str, host: &str, instant_book: bool) -> Uuid {
    let now = Utc::now();
    let listing = Listing {
        id: Uuid::new_v4(),
        tenant_id: tenant.to_owned(),
        host_id: host.to_owned(),
        title: "Harbour loft".to_owned(),
        price_per_night: Decimal::from_str("100.00").unwrap(),
        cleaning_fee: Decimal::from_str("30.00").unwrap(),
        currency: "USD".to_owned(),
        instant_book,
        cancellation_policy: "moderate".to_owned(),
        created_at: now,
        updated_at: now,
    };
    env.listings.upsert(&listing).await.unwrap();
    listing.id
}

async fn send(env: &TestEnv, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(env.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn user_request(
    method: &str,
    uri: &str,
    user: &str,
    tenant: &str,
    scopes: &str,
    body: Value,
) -> Request<Body> {
    let payload = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(USER_ID_HEADER, user)
        .header(TENANT_ID_HEADER, tenant)
        .header(USER_SCOPES_HEADER, scopes)
        .body(payload)
        .unwrap()
}

fn internal_request(method: &str, uri: &str, tenant: &str, body: Value) -> Request<Body> {
    let payload = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header(INTERNAL_TOKEN_HEADER, INTERNAL_TOKEN)
        .header(TENANT_ID_HEADER, tenant)
        .body(payload)
        .unwrap()
}

async fn create_booking(env: &TestEnv, listing: Uuid, guest: &str, tenant: &str) -> (StatusCode, Value) {
    send(
        env,
        user_request(
            "POST",
            "/bookings",
            guest,
            tenant,
            "bookings.create",
            json!({
                "listing_id": listing,
                "check_in": "2025-03-10",
                "check_out": "2025-03-12",
                "guests": 2
            }),
        ),
    )
    .await
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).unwrap()
}

#[tokio::test]
async fn instant_book_happy_path_to_confirmed() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (status, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "payment_pending");
    assert_eq!(body["total_amount"], "250.00"); // 2 x 100 + 30 cleaning + 20 fee
    assert_eq!(body["platform_fee"], "20.00");
    assert_eq!(body["cleaning_fee"], "30.00");
    let approved_at =
        chrono::DateTime::parse_from_rfc3339(body["approved_at"].as_str().unwrap()).unwrap();
    let expires_at =
        chrono::DateTime::parse_from_rfc3339(body["expires_at"].as_str().unwrap()).unwrap();
    assert_eq!((expires_at - approved_at).num_seconds(), 86_400);

    let booking_id = Uuid::from_str(body["id"].as_str().unwrap()).unwrap();

    // Both nights are claimed for this booking.
    let conflicts = env
        .availability
        .conflicts("t-1", listing, &[d("2025-03-10"), d("2025-03-11"), d("2025-03-12")])
        .await
        .unwrap();
    assert_eq!(conflicts, vec![d("2025-03-10"), d("2025-03-11")]);

    // The payment webhook drives the terminal confirm.
    let (status, body) = send(
        &env,
        internal_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "t-1",
            json!({ "payment_id": "pay_42" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(body["booking"]["payment_id"], "pay_42");

    // Redelivery of the same capture is a no-op.
    let (status, body) = send(
        &env,
        internal_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "t-1",
            json!({ "payment_id": "pay_42" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);
    assert_eq!(body["booking"]["status"], "confirmed");
}

#[tokio::test]
async fn approval_race_first_wins_second_conflicts() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", false).await;

    let book = |guest: &'static str| {
        user_request(
            "POST",
            "/bookings",
            guest,
            "t-1",
            "bookings.create",
            json!({
                "listing_id": listing,
                "check_in": "2025-04-01",
                "check_out": "2025-04-03",
                "guests": 1
            }),
        )
    };

    let (status, b1) = send(&env, book("guest-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(b1["status"], "pending_host_approval");
    assert!(b1["approved_at"].is_null());
    let (status, b2) = send(&env, book("guest-2")).await;
    assert_eq!(status, StatusCode::CREATED);

    let b1_id = b1["id"].as_str().unwrap();
    let b2_id = Uuid::from_str(b2["id"].as_str().unwrap()).unwrap();

    let approve = |id: String| {
        user_request(
            "POST",
            &format!("/bookings/{id}/approve"),
            "host-1",
            "t-1",
            "bookings.manage",
            Value::Null,
        )
    };

    let (status, body) = send(&env, approve(b1_id.to_owned())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "payment_pending");

    let (status, body) = send(&env, approve(b2_id.to_string())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["conflicts"], json!(["2025-04-01", "2025-04-02"]));

    // The losing booking is untouched.
    let loser = env.bookings.get("t-1", b2_id).await.unwrap().unwrap();
    assert_eq!(loser.status, BookingStatus::PendingHostApproval);
}

#[tokio::test]
async fn expired_booking_fails_releases_dates_and_ignores_late_capture() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = Uuid::from_str(body["id"].as_str().unwrap()).unwrap();

    // Rewind the expiry deadline past due.
    env.bookings
        .transition(
            "t-1",
            booking_id,
            &[BookingStatus::PaymentPending],
            BookingStatus::PaymentPending,
            TransitionPatch {
                expires_at: Some(Utc::now() - Duration::seconds(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (failed, completed) = sweep_once(&env.state).await.unwrap();
    assert_eq!((failed, completed), (1, 0));

    let booking = env.bookings.get("t-1", booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Failed);
    assert!(env
        .availability
        .conflicts("t-1", listing, &[d("2025-03-10"), d("2025-03-11")])
        .await
        .unwrap()
        .is_empty());

    // A capture arriving after expiry finds the guard false and changes nothing.
    let (status, body) = send(
        &env,
        internal_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "t-1",
            json!({ "payment_id": "pay_late" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], false);
    assert_eq!(body["booking"]["status"], "failed");
}

#[tokio::test]
async fn lazy_expiry_check_fails_booking_on_read() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = Uuid::from_str(body["id"].as_str().unwrap()).unwrap();

    env.bookings
        .transition(
            "t-1",
            booking_id,
            &[BookingStatus::PaymentPending],
            BookingStatus::PaymentPending,
            TransitionPatch {
                expires_at: Some(Utc::now() - Duration::seconds(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, body) = send(
        &env,
        user_request(
            "GET",
            &format!("/bookings/{booking_id}"),
            "guest-1",
            "t-1",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
}

#[tokio::test]
async fn cross_tenant_access_is_not_found() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = body["id"].as_str().unwrap().to_owned();

    // Scenario: a principal of tenant T2 probing a T1 booking id gets 404,
    // both on read and on mutation.
    let (status, _) = send(
        &env,
        user_request(
            "GET",
            &format!("/bookings/{booking_id}"),
            "guest-1",
            "t-2",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            "guest-1",
            "t-2",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Internal calls are tenant-scoped the same way.
    let (status, _) = send(
        &env,
        internal_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "t-2",
            json!({ "payment_id": "pay_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn host_cancel_from_confirmed_releases_dates() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = body["id"].as_str().unwrap().to_owned();

    send(
        &env,
        internal_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "t-1",
            json!({ "payment_id": "pay_7" }),
        ),
    )
    .await;

    let (status, body) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            "host-1",
            "t-1",
            "bookings.manage",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled_by_host");

    // The nights are bookable again.
    assert!(env
        .availability
        .conflicts("t-1", listing, &[d("2025-03-10"), d("2025-03-11")])
        .await
        .unwrap()
        .is_empty());

    // Terminal states stay terminal.
    let (status, body) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            "guest-1",
            "t-1",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid transition");
}

#[tokio::test]
async fn authorization_rules_are_enforced() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", false).await;

    // Creating without the guest scope is forbidden.
    let (status, _) = send(
        &env,
        user_request(
            "POST",
            "/bookings",
            "guest-1",
            "t-1",
            "bookings.manage",
            json!({
                "listing_id": listing,
                "check_in": "2025-03-10",
                "check_out": "2025-03-12",
                "guests": 2
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = body["id"].as_str().unwrap().to_owned();

    // Approval needs the host scope and the owning host.
    let (status, _) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/approve"),
            "host-2",
            "t-1",
            "bookings.manage",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A stranger cannot cancel.
    let (status, _) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/cancel"),
            "guest-9",
            "t-1",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Internal routes refuse user credentials.
    let (status, _) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/confirm"),
            "guest-1",
            "t-1",
            "bookings.create bookings.manage",
            json!({ "payment_id": "pay_1" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_400() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", false).await;

    let bad_range = json!({
        "listing_id": listing,
        "check_in": "2025-03-12",
        "check_out": "2025-03-10",
        "guests": 2
    });
    let (status, _) = send(
        &env,
        user_request("POST", "/bookings", "g", "t-1", "bookings.create", bad_range),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_guests = json!({
        "listing_id": listing,
        "check_in": "2025-03-10",
        "check_out": "2025-03-12",
        "guests": 0
    });
    let (status, _) = send(
        &env,
        user_request("POST", "/bookings", "g", "t-1", "bookings.create", no_guests),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &env,
        user_request(
            "POST",
            "/bookings",
            "g",
            "t-1",
            "bookings.create",
            json!({ "listing_id": "not-a-uuid" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reject_flips_pending_to_rejected_without_claiming() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", false).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = body["id"].as_str().unwrap().to_owned();

    let (status, body) = send(
        &env,
        user_request(
            "POST",
            &format!("/bookings/{booking_id}/reject"),
            "host-1",
            "t-1",
            "bookings.manage",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");

    assert!(env
        .availability
        .conflicts("t-1", listing, &[d("2025-03-10"), d("2025-03-11")])
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn checkout_session_persists_while_payment_pending() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", true).await;

    let (_, body) = create_booking(&env, listing, "guest-1", "t-1").await;
    let booking_id = body["id"].as_str().unwrap().to_owned();

    let (status, body) = send(
        &env,
        internal_request(
            "PUT",
            &format!("/bookings/{booking_id}/checkout"),
            "t-1",
            json!({ "checkout_session_id": "cs_123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], true);
    assert_eq!(body["booking"]["checkout_session_id"], "cs_123");
}

#[tokio::test]
async fn host_booking_list_is_scoped() {
    let env = test_env();
    let listing = seed_listing(&env, "t-1", "host-1", false).await;
    create_booking(&env, listing, "guest-1", "t-1").await;
    create_booking(&env, listing, "guest-2", "t-1").await;

    let (status, body) = send(
        &env,
        user_request(
            "GET",
            "/bookings/host",
            "host-1",
            "t-1",
            "bookings.manage",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &env,
        user_request(
            "GET",
            "/bookings",
            "guest-1",
            "t-1",
            "bookings.create",
            Value::Null,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}
