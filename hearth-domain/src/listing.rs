use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a listing the booking flow touches: pricing inputs, the
/// owning host, and the instant-book switch. Full listing CRUD lives in the
/// listings service proper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub tenant_id: String,
    pub host_id: String,
    #[serde(default)]
    pub title: String,
    pub price_per_night: Decimal,
    pub cleaning_fee: Decimal,
    pub currency: String,
    pub instant_book: bool,
    pub cancellation_policy: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Internal upsert payload for seeding and syncing the read model.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpsertListingRequest {
    pub host_id: String,
    #[serde(default)]
    pub title: String,
    pub price_per_night: Decimal,
    #[serde(default)]
    pub cleaning_fee: Decimal,
    pub currency: String,
    #[serde(default)]
    pub instant_book: bool,
    #[serde(default = "default_cancellation_policy")]
    pub cancellation_policy: String,
}

fn default_cancellation_policy() -> String {
    "moderate".to_owned()
}
