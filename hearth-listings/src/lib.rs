use axum::Router;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod handlers;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(handlers::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
