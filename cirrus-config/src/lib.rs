//! Configuration loading for the Cirrus accounts service.
//!
//! Values are resolved from an optional `.env` file, an optional TOML file
//! (`CIRRUS_CONFIG`, `cirrus.toml` or `config/cirrus.toml`) and the process
//! environment, then checked by a small set of guard rails.

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions,
};
pub use models::{
    CatalogConfig, Config, ConfigMetadata, DatabaseConfig, FlagsConfig,
    LoggingConfig, ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
