use std::sync::Arc;

use rust_decimal::Decimal;

use hearth_store::BookingStore;

use crate::flags::FlagsCache;
use crate::listings_client::ListingsClient;
use crate::sinks::SideChannels;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<dyn BookingStore>,
    pub listings: Arc<dyn ListingsClient>,
    pub sinks: SideChannels,
    pub flags: Arc<FlagsCache>,
    pub internal_token: String,
    pub platform_fee_percent: Decimal,
}
