use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use tracing::debug;

use super::{AccountRepository, RepositoryError, UniqueField};
use crate::account::{Account, ListQuery, NewAccountRecord};

const EMAIL_UNIQUE_INDEX: &str = "accounts_email_live_key";
const USERNAME_UNIQUE_INDEX: &str = "accounts_username_live_key";

const ACCOUNT_COLUMNS: &str =
    "id, email, username, password_hash, salt, deleted_at";

/// PostgreSQL-backed implementation of the [`AccountRepository`] port.
///
/// Each call checks a connection out of the pool for the duration of a single
/// statement. Uniqueness is enforced by the partial unique indexes created in
/// the `accounts` migration.
#[derive(Clone, Debug)]
pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: &PgRow) -> Result<Account, RepositoryError> {
        let id: i64 = row.try_get("id").map_err(|e| {
            RepositoryError::storage(format!("Failed to read account id: {e}"))
        })?;
        let email: String = row.try_get("email").map_err(|e| {
            RepositoryError::storage(format!("Failed to read email: {e}"))
        })?;
        let username: String = row.try_get("username").map_err(|e| {
            RepositoryError::storage(format!("Failed to read username: {e}"))
        })?;
        let password_hash: String = row.try_get("password_hash").map_err(|e| {
            RepositoryError::storage(format!(
                "Failed to read password hash: {e}"
            ))
        })?;
        let salt: String = row.try_get("salt").map_err(|e| {
            RepositoryError::storage(format!("Failed to read salt: {e}"))
        })?;
        let deleted_at: Option<DateTime<Utc>> =
            row.try_get("deleted_at").map_err(|e| {
                RepositoryError::storage(format!(
                    "Failed to read deleted_at: {e}"
                ))
            })?;

        let id = u64::try_from(id).map_err(|_| {
            RepositoryError::storage(format!("Negative account id {id}"))
        })?;

        Ok(Account {
            id,
            email,
            username,
            password_hash,
            salt,
            deleted_at,
        })
    }

    fn map_write_error(err: sqlx::Error, action: &str) -> RepositoryError {
        if let Some(db_err) = err.as_database_error() {
            match db_err.constraint() {
                Some(EMAIL_UNIQUE_INDEX) => {
                    return RepositoryError::Conflict(UniqueField::Email);
                }
                Some(USERNAME_UNIQUE_INDEX) => {
                    return RepositoryError::Conflict(UniqueField::Username);
                }
                _ => {}
            }
        }
        RepositoryError::storage(format!("Failed to {action}: {err}"))
    }

    async fn fetch_live_by(
        &self,
        column: &str,
        value: &str,
        action: &str,
    ) -> Result<Account, RepositoryError> {
        // `column` is one of two compile-time names, never caller input.
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE LOWER({column}) = LOWER($1) AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                RepositoryError::storage(format!("Failed to {action}: {e}"))
            })?;

        match row {
            Some(row) => Self::map_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn execute_update(
        &self,
        id: u64,
        sql: &str,
        values: &[&str],
        action: &str,
    ) -> Result<(), RepositoryError> {
        let Ok(id) = i64::try_from(id) else {
            return Err(RepositoryError::NotFound);
        };

        let mut query = sqlx::query(sql).bind(id);
        for value in values {
            query = query.bind(*value);
        }

        let result = query
            .execute(self.pool())
            .await
            .map_err(|e| Self::map_write_error(e, action))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Escape `%`, `_` and `\` so a filter is matched literally inside `LIKE`.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(
        &self,
        account: NewAccountRecord,
    ) -> Result<Account, RepositoryError> {
        let sql = format!(
            "INSERT INTO accounts (email, username, password_hash, salt) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&account.email)
            .bind(&account.username)
            .bind(&account.password_hash)
            .bind(&account.salt)
            .fetch_one(self.pool())
            .await
            .map_err(|e| Self::map_write_error(e, "create account"))?;

        let created = Self::map_row(&row)?;
        debug!(account_id = created.id, "account row inserted");
        Ok(created)
    }

    async fn get_by_id(&self, id: u64) -> Result<Account, RepositoryError> {
        let Ok(id) = i64::try_from(id) else {
            return Err(RepositoryError::NotFound);
        };

        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                RepositoryError::storage(format!(
                    "Failed to get account by id: {e}"
                ))
            })?;

        match row {
            Some(row) => Self::map_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn get_by_email(
        &self,
        email: &str,
    ) -> Result<Account, RepositoryError> {
        self.fetch_live_by("email", email, "get account by email")
            .await
    }

    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Account, RepositoryError> {
        self.fetch_live_by("username", username, "get account by username")
            .await
    }

    async fn list(
        &self,
        query: &ListQuery,
    ) -> Result<Vec<Account>, RepositoryError> {
        let Ok(cursor) = i64::try_from(query.cursor) else {
            return Ok(Vec::new());
        };

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE deleted_at IS NULL AND id > "
        ));
        builder.push_bind(cursor);

        if let Some(username) = query.username_filter() {
            builder
                .push(" AND LOWER(username) LIKE ")
                .push_bind(format!("%{}%", escape_like(&username)))
                .push(" ESCAPE '\\'");
        }
        if let Some(email) = query.email_filter() {
            builder
                .push(" AND LOWER(email) LIKE ")
                .push_bind(format!("%{}%", escape_like(&email)))
                .push(" ESCAPE '\\'");
        }

        builder
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(query.effective_limit());

        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                RepositoryError::storage(format!(
                    "Failed to list accounts: {e}"
                ))
            })?;

        let accounts = rows
            .iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = accounts.len(), "listed accounts");
        Ok(accounts)
    }

    async fn update_email(
        &self,
        id: u64,
        email: &str,
    ) -> Result<(), RepositoryError> {
        self.execute_update(
            id,
            "UPDATE accounts SET email = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
            &[email],
            "update email",
        )
        .await
    }

    async fn update_username(
        &self,
        id: u64,
        username: &str,
    ) -> Result<(), RepositoryError> {
        self.execute_update(
            id,
            "UPDATE accounts SET username = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
            &[username],
            "update username",
        )
        .await
    }

    async fn update_password(
        &self,
        id: u64,
        password_hash: &str,
        salt: &str,
    ) -> Result<(), RepositoryError> {
        self.execute_update(
            id,
            "UPDATE accounts SET password_hash = $2, salt = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
            &[password_hash, salt],
            "update password",
        )
        .await
    }

    async fn soft_delete(&self, id: u64) -> Result<(), RepositoryError> {
        let Ok(id) = i64::try_from(id) else {
            return Ok(());
        };

        let result = sqlx::query(
            "UPDATE accounts SET deleted_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| {
            RepositoryError::storage(format!("Failed to delete account: {e}"))
        })?;

        if result.rows_affected() > 0 {
            debug!(account_id = id, "tombstone set");
        }
        Ok(())
    }
}
