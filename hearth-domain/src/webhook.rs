use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EVENT_PAYMENT_CAPTURED: &str = "payment.captured";
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";
pub const EVENT_CHECKOUT_SESSION_CREATED: &str = "checkout.session.created";

/// Envelope delivered by the external payment gateway. Parsed only after the
/// signature over the raw body has been verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    pub booking_id: Uuid,
    pub tenant_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub checkout_session_id: Option<String>,
}
