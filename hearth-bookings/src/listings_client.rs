use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use uuid::Uuid;

use hearth_core::identity::{INTERNAL_TOKEN_HEADER, TENANT_ID_HEADER};
use hearth_core::ServiceError;
use hearth_domain::availability::{BookDatesRequest, ConflictsResponse};
use hearth_domain::listing::Listing;
use hearth_store::ClaimOutcome;

/// Everything bookings needs from the listings service: the pricing read
/// model and the atomic date reservation ops.
#[async_trait]
pub trait ListingsClient: Send + Sync {
    async fn get_listing(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
    ) -> Result<Option<Listing>, ServiceError>;

    async fn claim_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, ServiceError>;

    async fn release_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), ServiceError>;
}

pub struct HttpListingsClient {
    base_url: String,
    internal_token: String,
    http: reqwest::Client,
}

impl HttpListingsClient {
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
}

fn map_transport(context: &str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::UpstreamTimeout(format!("{context}: {err}"))
    } else {
        ServiceError::Upstream(format!("{context}: {err}"))
    }
}

#[async_trait]
impl ListingsClient for HttpListingsClient {
    async fn get_listing(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
    ) -> Result<Option<Listing>, ServiceError> {
        let url = format!("{}/listings/{}", self.base_url, listing_id);
        let response = self
            .http
            .get(&url)
            .header(TENANT_ID_HEADER, tenant_id)
            .send()
            .await
            .map_err(|e| map_transport("listings get", e))?;

        match response.status() {
            StatusCode::OK => {
                let listing = response
                    .json::<Listing>()
                    .await
                    .map_err(|e| ServiceError::Upstream(format!("listings get: {e}")))?;
                Ok(Some(listing))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ServiceError::Upstream(format!(
                "listings get returned {status}"
            ))),
        }
    }

    async fn claim_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<ClaimOutcome, ServiceError> {
        let url = format!("{}/listings/{}/availability/book", self.base_url, listing_id);
        let response = self
            .http
            .post(&url)
            .header(INTERNAL_TOKEN_HEADER, &self.internal_token)
            .header(TENANT_ID_HEADER, tenant_id)
            .json(&BookDatesRequest {
                booking_id,
                dates: dates.to_vec(),
            })
            .send()
            .await
            .map_err(|e| map_transport("listings claim", e))?;

        match response.status() {
            StatusCode::OK => Ok(ClaimOutcome::Claimed),
            StatusCode::CONFLICT => {
                let conflicts = response
                    .json::<ConflictsResponse>()
                    .await
                    .map_err(|e| ServiceError::Upstream(format!("listings claim: {e}")))?;
                Ok(ClaimOutcome::Conflicts(conflicts.conflicts))
            }
            status => Err(ServiceError::Upstream(format!(
                "listings claim returned {status}"
            ))),
        }
    }

    async fn release_dates(
        &self,
        tenant_id: &str,
        listing_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), ServiceError> {
        let url = format!(
            "{}/listings/{}/availability/book?booking_id={}",
            self.base_url, listing_id, booking_id
        );
        let response = self
            .http
            .delete(&url)
            .header(INTERNAL_TOKEN_HEADER, &self.internal_token)
            .header(TENANT_ID_HEADER, tenant_id)
            .send()
            .await
            .map_err(|e| map_transport("listings release", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ServiceError::Upstream(format!(
                "listings release returned {}",
                response.status()
            )))
        }
    }
}
