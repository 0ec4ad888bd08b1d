use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Best-effort notification to the external notify service. Failures are
/// logged and never surfaced to the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyEvent {
    pub kind: String,
    pub tenant_id: String,
    pub booking_id: Uuid,
    pub guest_id: String,
    pub host_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub tenant_id: String,
    pub booking_id: Uuid,
    pub timestamp: i64,
}
