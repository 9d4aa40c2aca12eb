use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use cirrus_core::CallerIdentity;

/// Header names the gateway sets, `CD_USER_LOGIN` and `CD_USER_ROLE`.
pub const LOGIN_HEADER: &str = "cd_user_login";
pub const ROLE_HEADER: &str = "cd_user_role";

/// Hyphenated spellings, read when the underscore form is absent.
pub const LOGIN_HEADER_ALT: &str = "cd-user-login";
pub const ROLE_HEADER_ALT: &str = "cd-user-role";

/// Caller identity set by the gateway. Missing or non-UTF-8 headers read as
/// empty strings; the feature gate decides what an anonymous caller may do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller(pub CallerIdentity);

fn header_value(headers: &HeaderMap, names: [&str; 2]) -> String {
    names
        .into_iter()
        .find_map(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self(CallerIdentity::new(
            header_value(headers, [LOGIN_HEADER, LOGIN_HEADER_ALT]),
            header_value(headers, [ROLE_HEADER, ROLE_HEADER_ALT]),
        ))
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
