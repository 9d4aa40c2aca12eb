use std::{fmt, sync::Arc, time::Duration};

use cirrus_core::{
    AccountError, AccountService, ErrorCatalog, FeatureGate, RequestContext,
    repository::AccountRepository,
};

use crate::infra::errors::AppError;

pub type DynAccountService = AccountService<dyn AccountRepository>;

/// Shared, read-only handles given to every handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<DynAccountService>,
    pub gate: Arc<FeatureGate>,
    pub catalog: Arc<ErrorCatalog>,
    pub request_timeout: Duration,
    pub app_name: Arc<str>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("app_name", &self.app_name)
            .field("request_timeout", &self.request_timeout)
            .field("catalog_entries", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        repository: Arc<dyn AccountRepository>,
        gate: FeatureGate,
        catalog: ErrorCatalog,
        request_timeout: Duration,
        app_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(repository)),
            gate: Arc::new(gate),
            catalog: Arc::new(catalog),
            request_timeout,
            app_name: app_name.into(),
        }
    }

    /// Fresh context for one request, bounded by the configured timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }

    pub fn error(&self, err: AccountError) -> AppError {
        AppError::from_account(&self.catalog, &err)
    }
}
