//! HTTP front end for the Cirrus accounts service.
//!
//! The binary in `main.rs` wires configuration, storage and the feature gate
//! into an [`AppState`] and serves [`routes::create_app`].

pub mod extract;
pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
