use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{AccountRepository, RepositoryError, UniqueField};
use crate::account::{Account, ListQuery, NewAccountRecord};

/// In-process repository with the same contract as the PostgreSQL adapter,
/// including uniqueness among live rows and soft deletes. Used as the test
/// double for the service and HTTP layers.
#[derive(Debug, Default)]
pub struct InMemoryAccountRepository {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    rows: BTreeMap<u64, Account>,
    last_id: u64,
    writes: usize,
    failure: Option<RepositoryError>,
}

impl State {
    fn check_failure(&self) -> Result<(), RepositoryError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn live(&self) -> impl Iterator<Item = &Account> {
        self.rows.values().filter(|row| !row.is_deleted())
    }

    fn find_live_by(
        &self,
        field: UniqueField,
        value: &str,
    ) -> Option<&Account> {
        let needle = value.to_lowercase();
        self.live().find(|row| {
            let candidate = match field {
                UniqueField::Email => &row.email,
                UniqueField::Username => &row.username,
            };
            candidate.to_lowercase() == needle
        })
    }

    fn ensure_unique(
        &self,
        field: UniqueField,
        value: &str,
        except: Option<u64>,
    ) -> Result<(), RepositoryError> {
        match self.find_live_by(field, value) {
            Some(owner) if Some(owner.id) != except => {
                Err(RepositoryError::Conflict(field))
            }
            _ => Ok(()),
        }
    }

    fn live_mut(&mut self, id: u64) -> Result<&mut Account, RepositoryError> {
        self.rows
            .get_mut(&id)
            .filter(|row| !row.is_deleted())
            .ok_or(RepositoryError::NotFound)
    }
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `failure` (or stop failing with
    /// `None`).
    pub async fn set_failure(&self, failure: Option<RepositoryError>) {
        self.state.lock().await.failure = failure;
    }

    /// The stored row regardless of its tombstone.
    pub async fn raw_row(&self, id: u64) -> Option<Account> {
        self.state.lock().await.rows.get(&id).cloned()
    }

    /// Number of successful mutations applied so far.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create(
        &self,
        account: NewAccountRecord,
    ) -> Result<Account, RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.ensure_unique(UniqueField::Email, &account.email, None)?;
        state.ensure_unique(UniqueField::Username, &account.username, None)?;

        state.last_id += 1;
        let stored = Account {
            id: state.last_id,
            email: account.email,
            username: account.username,
            password_hash: account.password_hash,
            salt: account.salt,
            deleted_at: None,
        };
        state.rows.insert(stored.id, stored.clone());
        state.writes += 1;
        Ok(stored)
    }

    async fn get_by_id(&self, id: u64) -> Result<Account, RepositoryError> {
        let state = self.state.lock().await;
        state.check_failure()?;
        state
            .live()
            .find(|row| row.id == id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_email(
        &self,
        email: &str,
    ) -> Result<Account, RepositoryError> {
        let state = self.state.lock().await;
        state.check_failure()?;
        state
            .find_live_by(UniqueField::Email, email)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Account, RepositoryError> {
        let state = self.state.lock().await;
        state.check_failure()?;
        state
            .find_live_by(UniqueField::Username, username)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Account>, RepositoryError> {
        let state = self.state.lock().await;
        state.check_failure()?;
        let limit =
            usize::try_from(query.effective_limit()).unwrap_or(usize::MAX);
        Ok(state
            .live()
            .filter(|row| query.matches(row))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_email(
        &self,
        id: u64,
        email: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.live_mut(id)?;
        state.ensure_unique(UniqueField::Email, email, Some(id))?;
        state.live_mut(id)?.email = email.to_string();
        state.writes += 1;
        Ok(())
    }

    async fn update_username(
        &self,
        id: u64,
        username: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        state.live_mut(id)?;
        state.ensure_unique(UniqueField::Username, username, Some(id))?;
        state.live_mut(id)?.username = username.to_string();
        state.writes += 1;
        Ok(())
    }

    async fn update_password(
        &self,
        id: u64,
        password_hash: &str,
        salt: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        let row = state.live_mut(id)?;
        row.password_hash = password_hash.to_string();
        row.salt = salt.to_string();
        state.writes += 1;
        Ok(())
    }

    async fn soft_delete(&self, id: u64) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().await;
        state.check_failure()?;
        if let Ok(row) = state.live_mut(id) {
            row.deleted_at = Some(Utc::now());
            state.writes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(email: &str, username: &str) -> NewAccountRecord {
        NewAccountRecord {
            email: email.into(),
            username: username.into(),
            password_hash: "hash".into(),
            salt: "salt".into(),
        }
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let repo = InMemoryAccountRepository::new();
        let first = repo.create(record("a@x.io", "a")).await.unwrap();
        let second = repo.create(record("b@x.io", "b")).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn enforces_case_insensitive_uniqueness() {
        let repo = InMemoryAccountRepository::new();
        repo.create(record("a@x.io", "alice")).await.unwrap();

        let err = repo.create(record("A@X.IO", "other")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(UniqueField::Email)));

        let err = repo.create(record("b@x.io", "ALICE")).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Conflict(UniqueField::Username)
        ));
    }

    #[tokio::test]
    async fn deleted_rows_release_unique_values() {
        let repo = InMemoryAccountRepository::new();
        let first = repo.create(record("a@x.io", "alice")).await.unwrap();
        repo.soft_delete(first.id).await.unwrap();

        let again = repo.create(record("a@x.io", "alice")).await.unwrap();
        assert_ne!(again.id, first.id);
        assert!(repo.raw_row(first.id).await.unwrap().is_deleted());
    }

    #[tokio::test]
    async fn soft_delete_is_idempotent() {
        let repo = InMemoryAccountRepository::new();
        let account = repo.create(record("a@x.io", "alice")).await.unwrap();
        repo.soft_delete(account.id).await.unwrap();
        repo.soft_delete(account.id).await.unwrap();
        repo.soft_delete(999).await.unwrap();
        assert!(repo.get_by_id(account.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn updates_reject_missing_rows() {
        let repo = InMemoryAccountRepository::new();
        let err = repo.update_email(5, "x@y.z").await.unwrap_err();
        assert!(err.is_not_found());
        let err = repo.update_password(5, "h", "s").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_failure_applies_to_every_call() {
        let repo = InMemoryAccountRepository::new();
        repo.set_failure(Some(RepositoryError::storage("down"))).await;
        assert!(matches!(
            repo.list(&ListQuery::default()).await,
            Err(RepositoryError::Storage(_))
        ));
        repo.set_failure(None).await;
        assert!(repo.list(&ListQuery::default()).await.unwrap().is_empty());
    }
}
