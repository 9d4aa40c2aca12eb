use std::{any::type_name_of_val, fmt, sync::Arc};

use tracing::{debug, error, info, warn};

use crate::{
    account::{Account, ListQuery, NewAccount, NewAccountRecord},
    context::RequestContext,
    credentials::SaltedHash,
    error::{AccountError, Result},
    repository::{AccountRepository, RepositoryError, UniqueField},
};

/// Account business rules on top of an [`AccountRepository`].
///
/// Uniqueness checks here are advisory: two concurrent creates can both pass
/// them, and the storage constraint then decides. Conflicts reported by the
/// repository are mapped to the same errors as a failed check.
pub struct AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    repository: Arc<R>,
}

impl<R> Clone for AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R> fmt::Debug for AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService")
            .field("repository", &type_name_of_val(self.repository.as_ref()))
            .finish()
    }
}

fn conflict_error(field: UniqueField) -> AccountError {
    match field {
        UniqueField::Email => AccountError::EmailAlreadyExists,
        UniqueField::Username => AccountError::UsernameAlreadyExists,
    }
}

fn internal(method: &'static str, err: &RepositoryError) -> AccountError {
    error!(method, error = %err, "repository call failed");
    AccountError::internal(err.to_string())
}

/// Turn a uniqueness lookup into an existence signal. `NotFound` means the
/// value is free.
fn existing_match(
    method: &'static str,
    result: std::result::Result<Account, RepositoryError>,
) -> Result<Option<Account>> {
    match result {
        Ok(account) => Ok(Some(account)),
        Err(RepositoryError::NotFound) => Ok(None),
        Err(err) => Err(internal(method, &err)),
    }
}

impl<R> AccountService<R>
where
    R: AccountRepository + ?Sized,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub async fn create_account(
        &self,
        ctx: &RequestContext,
        new_account: NewAccount,
    ) -> Result<Account> {
        const METHOD: &str = "create_account";

        let by_email = ctx
            .run(self.repository.get_by_email(&new_account.email))
            .await?;
        if existing_match(METHOD, by_email)?.is_some() {
            debug!(method = METHOD, "email already registered");
            return Err(AccountError::EmailAlreadyExists);
        }

        let by_username = ctx
            .run(self.repository.get_by_username(&new_account.username))
            .await?;
        if existing_match(METHOD, by_username)?.is_some() {
            debug!(method = METHOD, "username already taken");
            return Err(AccountError::UsernameAlreadyExists);
        }

        let SaltedHash { salt, hash } =
            SaltedHash::from_password(&new_account.password).map_err(|err| {
                error!(
                    method = METHOD,
                    error = %err,
                    "failed to derive credentials"
                );
                AccountError::internal(err.to_string())
            })?;

        let record = NewAccountRecord {
            email: new_account.email,
            username: new_account.username,
            password_hash: hash,
            salt,
        };

        match ctx.run(self.repository.create(record)).await? {
            Ok(account) => {
                info!(
                    method = METHOD,
                    account_id = account.id,
                    "account created"
                );
                Ok(account)
            }
            Err(RepositoryError::Conflict(field)) => {
                warn!(
                    method = METHOD,
                    ?field,
                    "lost uniqueness race on insert"
                );
                Err(conflict_error(field))
            }
            Err(err) => Err(internal(METHOD, &err)),
        }
    }

    pub async fn get_account(
        &self,
        ctx: &RequestContext,
        id: u64,
    ) -> Result<Account> {
        let found = ctx.run(self.repository.get_by_id(id)).await?;
        self.lookup("get_account", found)
    }

    pub async fn get_account_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> Result<Account> {
        self.lookup(
            "get_account_by_email",
            ctx.run(self.repository.get_by_email(email)).await?,
        )
    }

    pub async fn get_account_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> Result<Account> {
        self.lookup(
            "get_account_by_username",
            ctx.run(self.repository.get_by_username(username)).await?,
        )
    }

    fn lookup(
        &self,
        method: &'static str,
        result: std::result::Result<Account, RepositoryError>,
    ) -> Result<Account> {
        match result {
            Ok(account) => Ok(account),
            Err(RepositoryError::NotFound) => {
                debug!(method, "account not found");
                Err(AccountError::UserNotFound)
            }
            Err(err) => Err(internal(method, &err)),
        }
    }

    /// An empty page is a successful, empty result.
    pub async fn list_accounts(
        &self,
        ctx: &RequestContext,
        query: ListQuery,
    ) -> Result<Vec<Account>> {
        const METHOD: &str = "list_accounts";

        ctx.run(self.repository.list(&query))
            .await?
            .map_err(|err| internal(METHOD, &err))
    }

    pub async fn update_email(
        &self,
        ctx: &RequestContext,
        id: u64,
        email: &str,
    ) -> Result<()> {
        const METHOD: &str = "update_email";

        let owner = ctx.run(self.repository.get_by_email(email)).await?;
        if let Some(owner) = existing_match(METHOD, owner)?
            && owner.id != id
        {
            debug!(
                method = METHOD,
                account_id = id,
                "email owned by another account"
            );
            return Err(AccountError::EmailAlreadyExists);
        }

        self.get_account(ctx, id).await?;

        self.apply_write(
            METHOD,
            id,
            ctx.run(self.repository.update_email(id, email)).await?,
        )
    }

    pub async fn update_username(
        &self,
        ctx: &RequestContext,
        id: u64,
        username: &str,
    ) -> Result<()> {
        const METHOD: &str = "update_username";

        let owner = ctx.run(self.repository.get_by_username(username)).await?;
        if let Some(owner) = existing_match(METHOD, owner)?
            && owner.id != id
        {
            debug!(
                method = METHOD,
                account_id = id,
                "username owned by another account"
            );
            return Err(AccountError::UsernameAlreadyExists);
        }

        self.get_account(ctx, id).await?;

        self.apply_write(
            METHOD,
            id,
            ctx.run(self.repository.update_username(id, username)).await?,
        )
    }

    fn apply_write(
        &self,
        method: &'static str,
        id: u64,
        result: std::result::Result<(), RepositoryError>,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                info!(method, account_id = id, "account updated");
                Ok(())
            }
            Err(RepositoryError::Conflict(field)) => {
                warn!(
                    method,
                    account_id = id,
                    ?field,
                    "lost uniqueness race on update"
                );
                Err(conflict_error(field))
            }
            Err(RepositoryError::NotFound) => Err(AccountError::UserNotFound),
            Err(err) => Err(internal(method, &err)),
        }
    }

    /// Rotate the password. The old password must verify against the stored
    /// hash; on mismatch nothing is written.
    pub async fn update_password(
        &self,
        ctx: &RequestContext,
        id: u64,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        const METHOD: &str = "update_password";

        let account = self.get_account(ctx, id).await?;
        if !account.verify_password(old_password) {
            debug!(method = METHOD, account_id = id, "old password mismatch");
            return Err(AccountError::InvalidOldPassword);
        }

        let SaltedHash { salt, hash } = SaltedHash::from_password(new_password)
            .map_err(|err| {
                error!(
                    method = METHOD,
                    error = %err,
                    "failed to derive credentials"
                );
                AccountError::internal(err.to_string())
            })?;

        ctx.run(self.repository.update_password(id, &hash, &salt))
            .await?
            .map_err(|err| internal(METHOD, &err))?;

        info!(method = METHOD, account_id = id, "password rotated");
        Ok(())
    }

    /// Soft delete. Deleting a missing or already deleted account succeeds.
    pub async fn delete_account(
        &self,
        ctx: &RequestContext,
        id: u64,
    ) -> Result<()> {
        const METHOD: &str = "delete_account";

        ctx.run(self.repository.soft_delete(id))
            .await?
            .map_err(|err| internal(METHOD, &err))?;

        info!(method = METHOD, account_id = id, "account deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use async_trait::async_trait;
    use tracing::{
        Event, Level, Subscriber,
        field::{Field, Visit},
    };
    use tracing_subscriber::{
        Layer, layer::Context, layer::SubscriberExt, registry,
    };

    use super::*;
    use crate::repository::InMemoryAccountRepository;

    /// Collects `(message, has_method_field)` for every INFO event emitted
    /// from this crate.
    #[derive(Clone, Default)]
    struct InfoEvents(Arc<Mutex<Vec<(String, bool)>>>);

    #[derive(Default)]
    struct EventFields {
        message: String,
        has_method: bool,
    }

    impl Visit for EventFields {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            match field.name() {
                "message" => self.message = format!("{value:?}"),
                "method" => self.has_method = true,
                _ => {}
            }
        }
    }

    impl<S: Subscriber> Layer<S> for InfoEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let metadata = event.metadata();
            if *metadata.level() != Level::INFO
                || !metadata.target().starts_with("cirrus_core")
            {
                return;
            }
            let mut fields = EventFields::default();
            event.record(&mut fields);
            self.0
                .lock()
                .unwrap()
                .push((fields.message, fields.has_method));
        }
    }

    impl InfoEvents {
        fn take(&self) -> Vec<(String, bool)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    fn service() -> (
        AccountService<InMemoryAccountRepository>,
        Arc<InMemoryAccountRepository>,
    ) {
        let repo = Arc::new(InMemoryAccountRepository::new());
        (AccountService::new(Arc::clone(&repo)), repo)
    }

    fn new_account(email: &str, username: &str, password: &str) -> NewAccount {
        NewAccount {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    async fn seed(
        service: &AccountService<InMemoryAccountRepository>,
        email: &str,
        username: &str,
    ) -> Account {
        service
            .create_account(
                &RequestContext::background(),
                new_account(email, username, "s3cret"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_hashes_password_and_assigns_id() {
        let (service, repo) = service();
        let account = seed(&service, "alice@example.com", "alice").await;

        assert!(account.exists());
        let stored = repo.raw_row(account.id).await.unwrap();
        assert_ne!(stored.password_hash, "s3cret");
        assert_eq!(stored.salt.len(), crate::credentials::SALT_LENGTH);
        assert!(stored.verify_password("s3cret"));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_in_any_case() {
        let (service, repo) = service();
        seed(&service, "alice@example.com", "alice").await;
        let writes = repo.write_count().await;

        let err = service
            .create_account(
                &RequestContext::background(),
                new_account("ALICE@Example.com", "someone-else", "pw"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::EmailAlreadyExists));
        assert_eq!(repo.write_count().await, writes);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_username() {
        let (service, _) = service();
        seed(&service, "alice@example.com", "alice").await;

        let err = service
            .create_account(
                &RequestContext::background(),
                new_account("other@example.com", "Alice", "pw"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::UsernameAlreadyExists));
    }

    #[tokio::test]
    async fn create_maps_uniqueness_lookup_failure_to_internal() {
        let (service, repo) = service();
        repo.set_failure(Some(RepositoryError::storage("connection reset")))
            .await;

        let err = service
            .create_account(
                &RequestContext::background(),
                new_account("a@b.c", "a", "pw"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Internal(_)));
    }

    /// Lookups always report "free" so the insert hits the storage constraint.
    struct RacingRepository {
        inner: InMemoryAccountRepository,
    }

    #[async_trait]
    impl AccountRepository for RacingRepository {
        async fn create(
            &self,
            account: NewAccountRecord,
        ) -> std::result::Result<Account, RepositoryError> {
            self.inner.create(account).await
        }
        async fn get_by_id(
            &self,
            id: u64,
        ) -> std::result::Result<Account, RepositoryError> {
            self.inner.get_by_id(id).await
        }
        async fn get_by_email(
            &self,
            _email: &str,
        ) -> std::result::Result<Account, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        async fn get_by_username(
            &self,
            _username: &str,
        ) -> std::result::Result<Account, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        async fn list(
            &self,
            query: &ListQuery,
        ) -> std::result::Result<Vec<Account>, RepositoryError> {
            self.inner.list(query).await
        }
        async fn update_email(
            &self,
            id: u64,
            email: &str,
        ) -> std::result::Result<(), RepositoryError> {
            self.inner.update_email(id, email).await
        }
        async fn update_username(
            &self,
            id: u64,
            username: &str,
        ) -> std::result::Result<(), RepositoryError> {
            self.inner.update_username(id, username).await
        }
        async fn update_password(
            &self,
            id: u64,
            password_hash: &str,
            salt: &str,
        ) -> std::result::Result<(), RepositoryError> {
            self.inner.update_password(id, password_hash, salt).await
        }
        async fn soft_delete(
            &self,
            id: u64,
        ) -> std::result::Result<(), RepositoryError> {
            self.inner.soft_delete(id).await
        }
    }

    #[tokio::test]
    async fn storage_conflict_maps_to_already_exists() {
        let service = AccountService::new(Arc::new(RacingRepository {
            inner: InMemoryAccountRepository::new(),
        }));
        let ctx = RequestContext::background();
        let first = service
            .create_account(&ctx, new_account("a@b.c", "alpha", "pw"))
            .await
            .unwrap();
        let second = service
            .create_account(&ctx, new_account("b@b.c", "beta", "pw"))
            .await
            .unwrap();

        let err = service
            .create_account(&ctx, new_account("A@B.C", "gamma", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::EmailAlreadyExists));

        let err = service
            .update_username(&ctx, second.id, &first.username)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UsernameAlreadyExists));
    }

    #[tokio::test]
    async fn get_missing_account_is_not_found() {
        let (service, _) = service();
        let ctx = RequestContext::background();
        let err = service.get_account(&ctx, 42).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(
            service
                .get_account_by_email(&ctx, "nobody@example.com")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn lookups_ignore_case() {
        let (service, _) = service();
        let created = seed(&service, "Mixed@Example.com", "MixedCase").await;
        let ctx = RequestContext::background();

        let by_email = service
            .get_account_by_email(&ctx, "mixed@example.COM")
            .await
            .unwrap();
        let by_username = service
            .get_account_by_username(&ctx, "mixedcase")
            .await
            .unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_username.id, created.id);
    }

    #[tokio::test]
    async fn list_pages_by_cursor() {
        let (service, _) = service();
        for n in 1..=10 {
            let email = format!("user{n}@example.com");
            seed(&service, &email, &format!("user{n}")).await;
        }

        let page = service
            .list_accounts(
                &RequestContext::background(),
                ListQuery {
                    limit: 2,
                    cursor: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ids: Vec<u64> = page.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![6, 7]);
    }

    #[tokio::test]
    async fn empty_list_is_success() {
        let (service, _) = service();
        let page = service
            .list_accounts(&RequestContext::background(), ListQuery::default())
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn list_failure_is_internal() {
        let (service, repo) = service();
        repo.set_failure(Some(RepositoryError::storage("down"))).await;
        let err = service
            .list_accounts(&RequestContext::background(), ListQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Internal(_)));
    }

    #[tokio::test]
    async fn update_username_rejects_name_owned_by_another_account() {
        let (service, repo) = service();
        seed(&service, "alice@example.com", "alice").await;
        let bob = seed(&service, "bob@example.com", "bob").await;
        let ctx = RequestContext::background();

        let err = service
            .update_username(&ctx, bob.id, "ALICE")
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::UsernameAlreadyExists));
        assert_eq!(repo.raw_row(bob.id).await.unwrap().username, "bob");

        service.update_username(&ctx, bob.id, "robert").await.unwrap();
        assert_eq!(repo.raw_row(bob.id).await.unwrap().username, "robert");
    }

    #[tokio::test]
    async fn update_to_own_value_still_writes() {
        let (service, repo) = service();
        let alice = seed(&service, "alice@example.com", "alice").await;
        let writes = repo.write_count().await;

        service
            .update_email(
                &RequestContext::background(),
                alice.id,
                "ALICE@example.com",
            )
            .await
            .unwrap();

        assert_eq!(repo.write_count().await, writes + 1);
        assert_eq!(
            repo.raw_row(alice.id).await.unwrap().email,
            "ALICE@example.com"
        );
    }

    #[tokio::test]
    async fn update_email_on_missing_account_is_not_found() {
        let (service, _) = service();
        let err = service
            .update_email(&RequestContext::background(), 99, "free@example.com")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_email_rejects_address_owned_by_another_account() {
        let (service, _) = service();
        seed(&service, "alice@example.com", "alice").await;
        let bob = seed(&service, "bob@example.com", "bob").await;

        let err = service
            .update_email(
                &RequestContext::background(),
                bob.id,
                "Alice@Example.com",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn password_rotation_replaces_hash_and_salt() {
        let (service, repo) = service();
        let account = seed(&service, "alice@example.com", "alice").await;
        let before = repo.raw_row(account.id).await.unwrap();

        service
            .update_password(
                &RequestContext::background(),
                account.id,
                "s3cret",
                "n3w",
            )
            .await
            .unwrap();

        let after = repo.raw_row(account.id).await.unwrap();
        assert_ne!(after.salt, before.salt);
        assert_ne!(after.password_hash, before.password_hash);
        assert!(after.verify_password("n3w"));
        assert!(!after.verify_password("s3cret"));
    }

    #[tokio::test]
    async fn wrong_old_password_leaves_account_unchanged() {
        let (service, repo) = service();
        let account = seed(&service, "alice@example.com", "alice").await;
        let before = repo.raw_row(account.id).await.unwrap();
        let writes = repo.write_count().await;

        let err = service
            .update_password(
                &RequestContext::background(),
                account.id,
                "wrong",
                "n3w",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::InvalidOldPassword));
        assert_eq!(repo.raw_row(account.id).await.unwrap(), before);
        assert_eq!(repo.write_count().await, writes);
    }

    #[tokio::test]
    async fn soft_delete_hides_account_but_keeps_row() {
        let (service, repo) = service();
        let account = seed(&service, "alice@example.com", "alice").await;
        let ctx = RequestContext::background();

        service.delete_account(&ctx, account.id).await.unwrap();

        let err = service.get_account(&ctx, account.id).await.unwrap_err();
        assert!(matches!(err, AccountError::UserNotFound));
        let row = repo.raw_row(account.id).await.unwrap();
        assert!(row.is_deleted());
    }

    #[tokio::test]
    async fn deleting_missing_account_succeeds() {
        let (service, _) = service();
        service
            .delete_account(&RequestContext::background(), 1234)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_repository() {
        let (service, repo) = service();
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = service
            .create_account(&ctx, new_account("a@b.c", "a", "pw"))
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::Cancelled(_)));
        assert_eq!(repo.write_count().await, 0);
    }

    /// Never answers `get_by_id`, so only the context can end the call.
    struct StalledRepository;

    #[async_trait]
    impl AccountRepository for StalledRepository {
        async fn create(
            &self,
            _account: NewAccountRecord,
        ) -> std::result::Result<Account, RepositoryError> {
            Err(RepositoryError::storage("unused"))
        }
        async fn get_by_id(
            &self,
            _id: u64,
        ) -> std::result::Result<Account, RepositoryError> {
            std::future::pending().await
        }
        async fn get_by_email(
            &self,
            _email: &str,
        ) -> std::result::Result<Account, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        async fn get_by_username(
            &self,
            _username: &str,
        ) -> std::result::Result<Account, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        async fn list(
            &self,
            _query: &ListQuery,
        ) -> std::result::Result<Vec<Account>, RepositoryError> {
            Ok(Vec::new())
        }
        async fn update_email(
            &self,
            _id: u64,
            _email: &str,
        ) -> std::result::Result<(), RepositoryError> {
            Ok(())
        }
        async fn update_username(
            &self,
            _id: u64,
            _username: &str,
        ) -> std::result::Result<(), RepositoryError> {
            Ok(())
        }
        async fn update_password(
            &self,
            _id: u64,
            _password_hash: &str,
            _salt: &str,
        ) -> std::result::Result<(), RepositoryError> {
            Ok(())
        }
        async fn soft_delete(
            &self,
            _id: u64,
        ) -> std::result::Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_stalled_lookup() {
        let service = AccountService::new(Arc::new(StalledRepository));
        let ctx = RequestContext::with_timeout(Duration::from_millis(100));

        let err = service.get_account(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, AccountError::Cancelled(_)));
    }

    #[tokio::test]
    async fn create_and_delete_log_one_info_event_each() {
        let events = InfoEvents::default();
        let _guard = tracing::subscriber::set_default(
            registry().with(events.clone()),
        );
        let (service, _) = service();
        let ctx = RequestContext::background();

        let account = seed(&service, "alice@example.com", "alice").await;
        assert_eq!(
            events.take(),
            vec![("account created".to_string(), true)]
        );

        service.delete_account(&ctx, account.id).await.unwrap();
        assert_eq!(
            events.take(),
            vec![("account deleted".to_string(), true)]
        );
    }
}
