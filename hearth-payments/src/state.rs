use std::sync::Arc;

use hearth_store::DedupStore;

use crate::bookings_client::BookingsClient;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<dyn BookingsClient>,
    pub dedup: Arc<dyn DedupStore>,
    pub webhook_secret: String,
}
