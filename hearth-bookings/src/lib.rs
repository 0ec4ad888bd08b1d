use axum::Router;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod flags;
pub mod handlers;
pub mod listings_client;
pub mod sinks;
pub mod state;
pub mod sweeper;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
