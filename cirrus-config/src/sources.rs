use std::{collections::HashMap, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub catalog: FileCatalogConfig,
    #[serde(default)]
    pub flags: FileFlagsConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Human-readable duration such as `"10s"` or `"500ms"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_migrations: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCatalogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileFlagsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub app_name: Option<String>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub request_timeout_ms: Option<u64>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub database_run_migrations: Option<bool>,
    pub errors_path: Option<PathBuf>,
    pub fflags_endpoint: Option<String>,
    pub fflags_timeout_ms: Option<u64>,
    pub fflags_default_enabled: Option<bool>,
    pub logger_level: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get =
            |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let flag = |key: &str| get(key).and_then(|value| parse_bool(&value));

        Self {
            config_path: get("CIRRUS_CONFIG").map(PathBuf::from),
            app_name: get("APP_NAME"),
            server_host: get("SERVER_HOST"),
            server_port: parsed(get("SERVER_PORT"))
                .or_else(|| parsed(get("WEB_PORT"))),
            request_timeout_ms: parsed(get("REQUEST_TIMEOUT_MS")),
            database_url: get("DATABASE_URL"),
            database_max_connections: parsed(get("DATABASE_MAX_CONNECTIONS")),
            database_run_migrations: flag("DATABASE_RUN_MIGRATIONS"),
            errors_path: get("ERRORS_PATH").map(PathBuf::from),
            fflags_endpoint: get("FFLAGS_ENDPOINT"),
            fflags_timeout_ms: parsed(get("FFLAGS_TIMEOUT_MS")),
            fflags_default_enabled: flag("FFLAGS_DEFAULT_ENABLED"),
            logger_level: get("LOGGER_LEVEL"),
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|value| value.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
