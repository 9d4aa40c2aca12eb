use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cirrus_core::{AccountError, CatalogError, ErrorCatalog};
use std::fmt;
use tracing::debug;

pub type AppResult<T> = Result<T, AppError>;

/// A catalog entry on its way out as an HTTP response.
///
/// The body is `{code, message, description}`; the entry's status picks the
/// response status, falling back to 500 when it is not a usable HTTP status.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: CatalogError,
}

impl AppError {
    pub fn new(error: CatalogError) -> Self {
        let status = StatusCode::from_u16(error.status)
            .ok()
            .filter(|status| {
                status.is_client_error() || status.is_server_error()
            })
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }

    pub fn from_account(catalog: &ErrorCatalog, err: &AccountError) -> Self {
        let entry = catalog.resolve(err);
        if entry.is_unknown() {
            debug!(
                code = err.code().as_i32(),
                "no catalog entry for error code"
            );
        }
        Self::new(entry)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
