use std::collections::HashMap;

use async_trait::async_trait;

use super::{FlagError, FlagSource};
use crate::account::CallerIdentity;

/// Fixed decisions: one default plus per-flag overrides. Used when no relay
/// endpoint is configured, and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFlagSource {
    default_enabled: bool,
    overrides: HashMap<String, bool>,
}

impl StaticFlagSource {
    pub fn new(default_enabled: bool) -> Self {
        Self {
            default_enabled,
            overrides: HashMap::new(),
        }
    }

    pub fn all_enabled() -> Self {
        Self::new(true)
    }

    pub fn with_override(
        mut self,
        flag: impl Into<String>,
        enabled: bool,
    ) -> Self {
        self.overrides.insert(flag.into(), enabled);
        self
    }

    pub fn with_overrides<I, K>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        self.overrides
            .extend(overrides.into_iter().map(|(flag, on)| (flag.into(), on)));
        self
    }

    pub fn is_enabled(&self, flag: &str) -> bool {
        self.overrides
            .get(flag)
            .copied()
            .unwrap_or(self.default_enabled)
    }
}

#[async_trait]
impl FlagSource for StaticFlagSource {
    async fn evaluate(
        &self,
        flag: &str,
        _caller: &CallerIdentity,
    ) -> Result<bool, FlagError> {
        Ok(self.is_enabled(flag))
    }
}
