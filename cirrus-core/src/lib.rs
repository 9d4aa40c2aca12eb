//! # Cirrus Core
//!
//! Core library for the Cirrus accounts service: the account model, password
//! credentials, the data-driven error catalog, the persistence port with its
//! adapters, the account service and the per-operation feature gate.
//!
//! ## Feature Flags
//!
//! - `database`: PostgreSQL repository and embedded migrations (SQLx)
//! - `test-utils`: exposes the in-memory repository to downstream tests
//! - `pg-tests`: enables the PostgreSQL integration tests
//!
//! ## Architecture
//!
//! - [`credentials`]: salt generation, hashing and verification
//! - [`catalog`]: code → `{message, description, status}` lookup
//! - [`repository`]: the
//!   [`AccountRepository`](repository::AccountRepository) port
//! - [`service`]: [`AccountService`](service::AccountService) business rules
//! - [`flags`]: [`FeatureGate`](flags::FeatureGate) and flag sources
//! - [`context`]: per-request cancellation and deadline
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cirrus_core::{
//!     account::NewAccount, context::RequestContext,
//!     repository::PostgresAccountRepository, service::AccountService,
//! };
//!
//! async fn register(
//!     pool: sqlx::PgPool,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let repository = PostgresAccountRepository::new(pool);
//!     let service = AccountService::new(Arc::new(repository));
//!     let account = service
//!         .create_account(
//!             &RequestContext::background(),
//!             NewAccount {
//!                 email: "alice@example.com".into(),
//!                 username: "alice".into(),
//!                 password: "correct horse".into(),
//!             },
//!         )
//!         .await?;
//!     println!("created account {}", account.id);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Account model, list queries and caller identity
pub mod account;
/// Data-driven error catalog
pub mod catalog;
/// Request cancellation and deadlines
pub mod context;
/// Password salting and hashing
pub mod credentials;
/// Account error taxonomy and stable codes
pub mod error;
/// Feature gate and flag sources
pub mod flags;
/// Persistence port and adapters
pub mod repository;
/// Account business rules
pub mod service;

pub use account::{Account, CallerIdentity, ListQuery, NewAccount};
pub use catalog::{CatalogError, ErrorCatalog};
pub use context::RequestContext;
pub use error::{AccountError, ErrorCode, Result};
pub use flags::FeatureGate;
pub use service::AccountService;

/// Embedded schema migrations for the `accounts` table.
#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
