use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": &*state.app_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
