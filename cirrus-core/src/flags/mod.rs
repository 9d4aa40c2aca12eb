//! Per-operation feature gate evaluated against the caller identity.

use std::{any::type_name_of_val, fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    account::CallerIdentity, context::RequestContext, error::AccountError,
};

pub mod relay;
pub mod static_source;

pub use relay::RelayFlagSource;
pub use static_source::StaticFlagSource;

/// Flag names, one per gated account operation.
pub mod operation {
    pub const CREATE_USER: &str = "create_user";
    pub const GET_USER: &str = "get_user";
    pub const GET_USERS: &str = "get_users";
    pub const UPDATE_EMAIL: &str = "update_email";
    pub const UPDATE_USERNAME: &str = "update_username";
    pub const UPDATE_PASSWORD: &str = "update_password";
    pub const DELETE_USER: &str = "delete_user";

    pub const ALL: [&str; 7] = [
        CREATE_USER,
        GET_USER,
        GET_USERS,
        UPDATE_EMAIL,
        UPDATE_USERNAME,
        UPDATE_PASSWORD,
        DELETE_USER,
    ];
}

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("flag client could not be built: {0}")]
    Client(String),

    #[error("flag backend unreachable: {0}")]
    Transport(String),

    #[error("flag backend answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("flag response could not be decoded: {0}")]
    Decode(String),

    #[error("flag '{flag}' evaluation failed: {reason}")]
    Evaluation { flag: String, reason: String },
}

/// Backend that decides whether `flag` is on for `caller`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn evaluate(
        &self,
        flag: &str,
        caller: &CallerIdentity,
    ) -> Result<bool, FlagError>;
}

/// Fail-closed gate in front of every account operation.
///
/// Only an explicit `true` from the source lets a call through. A `false`
/// decision and a failed evaluation both deny with
/// [`AccountError::FeatureDisabled`].
#[derive(Clone)]
pub struct FeatureGate {
    source: Arc<dyn FlagSource>,
}

impl fmt::Debug for FeatureGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureGate")
            .field("source", &type_name_of_val(self.source.as_ref()))
            .finish()
    }
}

impl FeatureGate {
    pub fn new(source: Arc<dyn FlagSource>) -> Self {
        Self { source }
    }

    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        operation: &str,
        caller: &CallerIdentity,
    ) -> Result<(), AccountError> {
        let decision = ctx.run(self.source.evaluate(operation, caller)).await?;

        match decision {
            Ok(true) => {
                debug!(operation, login = %caller.login, "feature enabled");
                Ok(())
            }
            Ok(false) => {
                warn!(
                    operation,
                    login = %caller.login,
                    role = %caller.role,
                    "feature disabled for caller"
                );
                Err(AccountError::FeatureDisabled {
                    feature: operation.to_string(),
                })
            }
            Err(err) => {
                warn!(
                    operation,
                    login = %caller.login,
                    role = %caller.role,
                    error = %err,
                    "feature flag evaluation failed; denying"
                );
                Err(AccountError::FeatureDisabled {
                    feature: operation.to_string(),
                })
            }
        }
    }
}
