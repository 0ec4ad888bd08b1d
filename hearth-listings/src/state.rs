use std::sync::Arc;

use hearth_store::{AvailabilityStore, ListingStore};

#[derive(Clone)]
pub struct AppState {
    pub listings: Arc<dyn ListingStore>,
    pub availability: Arc<dyn AvailabilityStore>,
    pub internal_token: String,
}
