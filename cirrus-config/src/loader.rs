use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use url::Url;

use crate::{
    models::{
        CatalogConfig, Config, ConfigMetadata, DEFAULT_APP_NAME,
        DEFAULT_CATALOG_PATH, DEFAULT_FLAGS_TIMEOUT, DEFAULT_HOST,
        DEFAULT_LOG_LEVEL, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT,
        DEFAULT_REQUEST_TIMEOUT, DatabaseConfig, FlagsConfig, LoggingConfig,
        ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["cirrus.toml", "config/cirrus.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Fully resolved configuration plus the warnings raised while building it.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

/// Resolves configuration from `.env`, an optional TOML file and the process
/// environment. Environment values win over the file; the file wins over
/// built-in defaults.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolve against already gathered environment values. `.env` files are
    /// not consulted.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let (config, warnings) =
            self.compose_config(file_config, env, config_path)?;
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

        Ok((Some(file_config), Some(path)))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if config_path.is_none() {
            warnings.push_with_hint(
                "No cirrus.toml detected; \
                 falling back to environment variables",
                "Set CIRRUS_CONFIG or create config/cirrus.toml",
            );
        }

        let FileConfig {
            app_name: file_app_name,
            server: file_server,
            database: file_database,
            catalog: file_catalog,
            flags: file_flags,
            logging: file_logging,
        } = file_config.unwrap_or_default();

        let server = ServerConfig {
            host: env
                .server_host
                .or(file_server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
            request_timeout: resolve_duration(
                "server.request_timeout",
                env.request_timeout_ms,
                file_server.request_timeout.as_deref(),
                DEFAULT_REQUEST_TIMEOUT,
            )?,
        };

        let database = DatabaseConfig {
            url: env.database_url.or(file_database
                .url
                .filter(|value| !value.trim().is_empty())),
            max_connections: env
                .database_max_connections
                .or(file_database.max_connections)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            run_migrations: env
                .database_run_migrations
                .or(file_database.run_migrations)
                .unwrap_or(true),
        };

        let catalog = CatalogConfig {
            path: env
                .errors_path
                .or(file_catalog.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH)),
        };

        let endpoint = env
            .fflags_endpoint
            .or(file_flags.endpoint.filter(|value| !value.trim().is_empty()))
            .map(|raw| {
                Url::parse(raw.trim()).map_err(|source| {
                    ConfigLoadError::InvalidFlagsEndpoint { url: raw, source }
                })
            })
            .transpose()?;

        let flags = FlagsConfig {
            endpoint,
            timeout: resolve_duration(
                "flags.timeout",
                env.fflags_timeout_ms,
                file_flags.timeout.as_deref(),
                DEFAULT_FLAGS_TIMEOUT,
            )?,
            default_enabled: env
                .fflags_default_enabled
                .or(file_flags.default_enabled)
                .unwrap_or(false),
            overrides: file_flags.overrides,
        };

        let logging = LoggingConfig {
            level: env
                .logger_level
                .or(file_logging.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        let config = Config {
            app_name: env
                .app_name
                .or(file_app_name)
                .unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            server,
            database,
            catalog,
            flags,
            logging,
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok((config, warnings))
    }
}

/// Environment milliseconds beat a humantime string from the file.
fn resolve_duration(
    field: &'static str,
    env_ms: Option<u64>,
    file_value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    if let Some(ms) = env_ms {
        return Ok(Duration::from_millis(ms));
    }
    match file_value {
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration {
                field,
                value: raw.to_string(),
                source,
            }
        }),
        None => Ok(default),
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration '{value}' for {field}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid feature flag endpoint '{url}'")]
    InvalidFlagsEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoadError {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigLoadError::MissingConfig { path }
            | ConfigLoadError::Io { path, .. }
            | ConfigLoadError::Parse { path, .. } => Some(path),
            _ => None,
        }
    }
}
