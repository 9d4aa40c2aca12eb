use axum::{
    Router,
    routing::{get, patch},
};

use crate::{handlers::accounts, infra::app_state::AppState};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            get(accounts::list_users).post(accounts::create_user),
        )
        .route(
            "/users/{id}",
            get(accounts::get_user).delete(accounts::delete_user),
        )
        .route("/users/{id}/email", patch(accounts::update_email))
        .route("/users/{id}/username", patch(accounts::update_username))
        .route("/users/{id}/password", patch(accounts::update_password))
}
