use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials;

/// Page size used when a list query does not specify a positive limit.
pub const DEFAULT_LIST_LIMIT: i64 = 1000;

/// A stored user account.
///
/// Credential material and the tombstone never leave the process: they are
/// skipped when the account is serialized for a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: u64,
    pub email: String,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(skip)]
    pub salt: String,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// `id == 0` is the "no such account" sentinel.
    pub fn exists(&self) -> bool {
        self.id != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn verify_password(&self, password: &str) -> bool {
        credentials::verify(password, self)
    }
}

/// Inbound request to create an account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Row handed to the repository on insert; credentials are already derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccountRecord {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
}

/// Cursor-paginated listing with optional case-insensitive substring filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    /// Last id seen by the caller; only ids strictly greater are returned.
    pub cursor: u64,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl ListQuery {
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_LIST_LIMIT
        } else {
            self.limit
        }
    }

    pub fn username_filter(&self) -> Option<String> {
        normalized_filter(self.username.as_deref())
    }

    pub fn email_filter(&self) -> Option<String> {
        normalized_filter(self.email.as_deref())
    }

    /// In-process equivalent of the storage filter, used by adapters that
    /// cannot push the predicate down.
    pub fn matches(&self, account: &Account) -> bool {
        if account.id <= self.cursor {
            return false;
        }
        if let Some(needle) = self.username_filter()
            && !account.username.to_lowercase().contains(&needle)
        {
            return false;
        }
        if let Some(needle) = self.email_filter()
            && !account.email.to_lowercase().contains(&needle)
        {
            return false;
        }
        true
    }
}

fn normalized_filter(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// Who is calling, as reported by the upstream gateway headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub login: String,
    pub role: String,
}

impl CallerIdentity {
    pub fn new(login: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            role: role.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: u64, email: &str, username: &str) -> Account {
        Account {
            id,
            email: email.into(),
            username: username.into(),
            password_hash: "hash".into(),
            salt: "salt".into(),
            deleted_at: None,
        }
    }

    #[test]
    fn serialization_hides_credentials() {
        let value = serde_json::to_value(account(7, "a@b.c", "alice")).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["email"], "a@b.c");
        assert!(value.get("password_hash").is_none());
        assert!(value.get("salt").is_none());
        assert!(value.get("deleted_at").is_none());
    }

    #[test]
    fn non_positive_limit_uses_default() {
        let query = ListQuery {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), DEFAULT_LIST_LIMIT);
        let query = ListQuery {
            limit: -4,
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), DEFAULT_LIST_LIMIT);
    }

    #[test]
    fn filters_are_case_insensitive_and_anded() {
        let query = ListQuery {
            cursor: 1,
            username: Some("AL".into()),
            email: Some("Example".into()),
            ..Default::default()
        };
        assert!(query.matches(&account(2, "alice@example.com", "Alice")));
        assert!(!query.matches(&account(1, "alice@example.com", "Alice")));
        assert!(!query.matches(&account(3, "alice@other.org", "Alice")));
        assert!(!query.matches(&account(4, "bob@example.com", "bob")));
    }

    #[test]
    fn blank_filters_are_ignored() {
        let query = ListQuery {
            username: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(query.username_filter(), None);
        assert!(query.matches(&account(1, "x@y.z", "x")));
    }
}
