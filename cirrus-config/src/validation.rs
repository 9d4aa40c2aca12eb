use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

/// Non-fatal findings collected while loading; logged once tracing is up.
#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("server port must be non-zero")]
    ZeroPort,
    #[error(
        "unsupported database URL scheme '{scheme}': \
         expected postgres:// or postgresql://"
    )]
    UnsupportedDatabaseScheme { scheme: String },
    #[error("database max_connections must be at least 1")]
    ZeroConnections,
    #[error("request timeout must be non-zero")]
    ZeroRequestTimeout,
}

/// Reject configurations the server cannot run with and collect warnings for
/// the ones it can but probably should not.
pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.server.port == 0 {
        return Err(ConfigGuardRailError::ZeroPort);
    }
    if config.server.request_timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroRequestTimeout);
    }
    if config.database.max_connections == 0 {
        return Err(ConfigGuardRailError::ZeroConnections);
    }

    match config.database.url.as_deref() {
        Some(url) => {
            let scheme = url.split("://").next().unwrap_or_default();
            if !matches!(scheme, "postgres" | "postgresql") {
                return Err(ConfigGuardRailError::UnsupportedDatabaseScheme {
                    scheme: scheme.to_string(),
                });
            }
        }
        None => warnings.push_with_hint(
            "No database URL configured",
            "Set DATABASE_URL before running `serve` or `db migrate`",
        ),
    }

    if config.flags.endpoint.is_none() {
        if config.flags.default_enabled {
            warnings.push_with_hint(
                "No feature flag endpoint; \
                 every operation is enabled by default",
                "Set FFLAGS_ENDPOINT to evaluate flags per caller",
            );
        } else if config.flags.overrides.is_empty() {
            warnings.push_with_hint(
                "No feature flag endpoint and no overrides; \
                 every operation is disabled",
                "Set FFLAGS_ENDPOINT or FFLAGS_DEFAULT_ENABLED=true",
            );
        }
    }

    if !config.catalog.path.exists() {
        warnings.push_with_hint(
            format!(
                "Error catalog {} not found; \
                 every error will render as unknown",
                config.catalog.path.display()
            ),
            "Set ERRORS_PATH to the errors.json shipped in config/",
        );
    }

    Ok(warnings)
}
