use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{FlagError, FlagSource};
use crate::account::CallerIdentity;

/// Evaluates flags against a GO Feature Flag relay proxy.
///
/// Each check is one `POST {endpoint}/v1/feature/{flag}/eval` carrying the
/// caller's login and role in the evaluation context.
#[derive(Debug, Clone)]
pub struct RelayFlagSource {
    client: Client,
    endpoint: Url,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvalRequest<'a> {
    evaluation_context: EvalContext<'a>,
    default_value: bool,
}

#[derive(Debug, Serialize)]
struct EvalContext<'a> {
    key: &'a str,
    custom: EvalCustom<'a>,
}

#[derive(Debug, Serialize)]
struct EvalCustom<'a> {
    login: &'a str,
    role: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvalResponse {
    value: serde_json::Value,
    #[serde(default)]
    failed: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl RelayFlagSource {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, FlagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FlagError::Client(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn eval_url(&self, flag: &str) -> Result<Url, FlagError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FlagError::Client(format!(
                    "flag endpoint {} cannot be a base URL",
                    self.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["v1", "feature", flag, "eval"]);
        Ok(url)
    }
}

fn decode(flag: &str, response: EvalResponse) -> Result<bool, FlagError> {
    if response.failed {
        return Err(FlagError::Evaluation {
            flag: flag.to_string(),
            reason: response
                .error_code
                .or(response.reason)
                .unwrap_or_else(|| "unspecified".to_string()),
        });
    }

    response.value.as_bool().ok_or_else(|| {
        FlagError::Decode(format!(
            "flag '{flag}' returned non-boolean value {}",
            response.value
        ))
    })
}

#[async_trait]
impl FlagSource for RelayFlagSource {
    async fn evaluate(
        &self,
        flag: &str,
        caller: &CallerIdentity,
    ) -> Result<bool, FlagError> {
        let url = self.eval_url(flag)?;
        let body = EvalRequest {
            evaluation_context: EvalContext {
                key: &caller.login,
                custom: EvalCustom {
                    login: &caller.login,
                    role: &caller.role,
                },
            },
            default_value: false,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FlagError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlagError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EvalResponse = response
            .json()
            .await
            .map_err(|e| FlagError::Decode(e.to_string()))?;

        let enabled = decode(flag, payload)?;
        debug!(flag, login = %caller.login, enabled, "flag evaluated");
        Ok(enabled)
    }
}
