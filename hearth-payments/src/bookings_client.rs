use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use uuid::Uuid;

use hearth_core::identity::{INTERNAL_TOKEN_HEADER, TENANT_ID_HEADER};
use hearth_core::ServiceError;
use hearth_domain::booking::{ConfirmBookingRequest, SetCheckoutRequest};

/// The privileged slice of the bookings service the webhook ingestor drives.
/// Every call carries the internal token and the tenant from the event.
#[async_trait]
pub trait BookingsClient: Send + Sync {
    async fn confirm(
        &self,
        tenant_id: &str,
        booking_id: Uuid,
        payment_id: &str,
    ) -> Result<(), ServiceError>;

    async fn fail(&self, tenant_id: &str, booking_id: Uuid) -> Result<(), ServiceError>;

    async fn set_checkout(
        &self,
        tenant_id: &str,
        booking_id: Uuid,
        checkout_session_id: &str,
    ) -> Result<(), ServiceError>;
}

pub struct HttpBookingsClient {
    base_url: String,
    internal_token: String,
    http: reqwest::Client,
}

impl HttpBookingsClient {
    pub fn new(base_url: String, internal_token: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            internal_token,
            http,
        })
    }

    async fn post_internal<T: serde::Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        tenant_id: &str,
        payload: Option<&T>,
    ) -> Result<(), ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .header(INTERNAL_TOKEN_HEADER, &self.internal_token)
            .header(TENANT_ID_HEADER, tenant_id);
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ServiceError::UpstreamTimeout(format!("bookings {path}: {e}"))
            } else {
                ServiceError::Upstream(format!("bookings {path}: {e}"))
            }
        })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(ServiceError::not_found("booking not found")),
            status => Err(ServiceError::Upstream(format!(
                "bookings {path} returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl BookingsClient for HttpBookingsClient {
    async fn confirm(
        &self,
        tenant_id: &str,
        booking_id: Uuid,
        payment_id: &str,
    ) -> Result<(), ServiceError> {
        self.post_internal(
            reqwest::Method::POST,
            &format!("/bookings/{booking_id}/confirm"),
            tenant_id,
            Some(&ConfirmBookingRequest {
                payment_id: payment_id.to_owned(),
            }),
        )
        .await
    }

    async fn fail(&self, tenant_id: &str, booking_id: Uuid) -> Result<(), ServiceError> {
        self.post_internal::<()>(
            reqwest::Method::POST,
            &format!("/bookings/{booking_id}/fail"),
            tenant_id,
            None,
        )
        .await
    }

    async fn set_checkout(
        &self,
        tenant_id: &str,
        booking_id: Uuid,
        checkout_session_id: &str,
    ) -> Result<(), ServiceError> {
        self.post_internal(
            reqwest::Method::PUT,
            &format!("/bookings/{booking_id}/checkout"),
            tenant_id,
            Some(&SetCheckoutRequest {
                checkout_session_id: checkout_session_id.to_owned(),
            }),
        )
        .await
    }
}
