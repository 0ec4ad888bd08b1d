use axum::Router;
use tower_http::trace::TraceLayer;

pub mod bookings_client;
pub mod config;
pub mod signature;
pub mod state;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(webhooks::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
