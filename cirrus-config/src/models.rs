use std::{collections::HashMap, path::PathBuf, time::Duration};

use url::Url;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_CATALOG_PATH: &str = "config/errors.json";
pub const DEFAULT_FLAGS_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_APP_NAME: &str = "cirrus-users";

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub flags: FlagsConfig,
    pub logging: LoggingConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single request, applied as the request deadline.
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Required to serve; `None` is rejected at start-up.
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FlagsConfig {
    /// Relay proxy base URL. Without one a static source is used.
    pub endpoint: Option<Url>,
    pub timeout: Duration,
    /// Static-source decision for flags without an override.
    pub default_enabled: bool,
    pub overrides: HashMap<String, bool>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
