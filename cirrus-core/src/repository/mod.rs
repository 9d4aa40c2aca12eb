use async_trait::async_trait;
use thiserror::Error;

use crate::account::{Account, ListQuery, NewAccountRecord};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryAccountRepository;
#[cfg(feature = "database")]
pub use postgres::PostgresAccountRepository;

/// Column guarded by a uniqueness constraint among live accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("account not found")]
    NotFound,

    #[error("unique constraint violated on {0:?}")]
    Conflict(UniqueField),

    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        RepositoryError::Storage(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound)
    }
}

/// Persistence port for accounts.
///
/// Every read only sees live rows (no tombstone). Email and username lookups
/// compare case-insensitively. Implementations must enforce email/username
/// uniqueness atomically; the service's pre-insert checks are advisory only.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a row and return it with the storage-assigned id.
    async fn create(
        &self,
        account: NewAccountRecord,
    ) -> Result<Account, RepositoryError>;

    async fn get_by_id(&self, id: u64) -> Result<Account, RepositoryError>;

    async fn get_by_email(&self, email: &str)
    -> Result<Account, RepositoryError>;

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Account, RepositoryError>;

    /// Ascending by id, `id > cursor`, at most `limit` rows. An empty page is
    /// `Ok(vec![])`, never `NotFound`.
    async fn list(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Account>, RepositoryError>;

    async fn update_email(
        &self,
        id: u64,
        email: &str,
    ) -> Result<(), RepositoryError>;

    async fn update_username(
        &self,
        id: u64,
        username: &str,
    ) -> Result<(), RepositoryError>;

    /// Replace the hash and salt together.
    async fn update_password(
        &self,
        id: u64,
        password_hash: &str,
        salt: &str,
    ) -> Result<(), RepositoryError>;

    /// Set the tombstone. Idempotent: deleting a missing or already deleted
    /// account succeeds.
    async fn soft_delete(&self, id: u64) -> Result<(), RepositoryError>;
}
