use thiserror::Error;

/// Stable integer codes resolved through the
/// [`ErrorCatalog`](crate::catalog::ErrorCatalog).
///
/// The numeric values are part of the wire contract; clients match on them,
/// so existing discriminants must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    InvalidBody = 1000,
    InvalidId = 1001,
    InvalidEmail = 1002,
    InvalidUsername = 1003,
    InvalidPassword = 1004,
    InvalidOldPassword = 1005,
    InvalidNewPassword = 1006,
    InternalError = 1007,
    InvalidQuery = 1008,
    UserNotFound = 1009,
    EmailAlreadyExists = 1010,
    UsernameAlreadyExists = 1011,
    FeatureIsDisabled = 1012,
    RequestCancelled = 1013,
}

impl ErrorCode {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

/// Every failure an account operation can surface to its caller.
///
/// Each variant maps onto exactly one [`ErrorCode`]; transports render the
/// matching catalog entry rather than the `Display` text, which is meant for
/// logs.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("request body could not be parsed: {0}")]
    InvalidBody(String),

    #[error("account id is malformed: {0}")]
    InvalidId(String),

    #[error("list query is malformed: {0}")]
    InvalidQuery(String),

    #[error("email is already registered")]
    EmailAlreadyExists,

    #[error("username is already taken")]
    UsernameAlreadyExists,

    #[error("account not found")]
    UserNotFound,

    #[error("old password does not match")]
    InvalidOldPassword,

    #[error("feature '{feature}' is disabled for this caller")]
    FeatureDisabled { feature: String },

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccountError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AccountError::InvalidBody(_) => ErrorCode::InvalidBody,
            AccountError::InvalidId(_) => ErrorCode::InvalidId,
            AccountError::InvalidQuery(_) => ErrorCode::InvalidQuery,
            AccountError::EmailAlreadyExists => ErrorCode::EmailAlreadyExists,
            AccountError::UsernameAlreadyExists => {
                ErrorCode::UsernameAlreadyExists
            }
            AccountError::UserNotFound => ErrorCode::UserNotFound,
            AccountError::InvalidOldPassword => ErrorCode::InvalidOldPassword,
            AccountError::FeatureDisabled { .. } => {
                ErrorCode::FeatureIsDisabled
            }
            AccountError::Cancelled(_) => ErrorCode::RequestCancelled,
            AccountError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AccountError::Internal(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AccountError::UserNotFound)
    }
}

pub type Result<T> = std::result::Result<T, AccountError>;
