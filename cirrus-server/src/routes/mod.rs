pub mod v1;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{handlers::health, infra::app_state::AppState};

/// Create the main API router with all versions
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest("/api/v1", v1::create_v1_router())
}

/// Full application: versioned API, liveness routes and request tracing.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .merge(create_api_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
