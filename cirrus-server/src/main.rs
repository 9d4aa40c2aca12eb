//! # Cirrus Server
//!
//! User-accounts service: account creation, lookup, filtered listing,
//! credential rotation and soft deletion behind a per-operation feature gate.
//!
//! The server is built on Axum and uses:
//! - PostgreSQL for persistent storage
//! - a GO Feature Flag relay proxy (or static flags) for the feature gate
//! - a JSON error catalog for every error response

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};

use cirrus_config::{Config, ConfigLoad, ConfigLoader, FlagsConfig};
use cirrus_core::{
    ErrorCatalog, FeatureGate,
    flags::{FlagSource, RelayFlagSource, StaticFlagSource},
    repository::{AccountRepository, PostgresAccountRepository},
};
use cirrus_server::{
    AppState,
    infra::{shutdown::shutdown_signal, telemetry::init_tracing},
    routes,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "cirrus-server")]
#[command(about = "User accounts service with feature-gated operations")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Path to a cirrus.toml configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => {
            run_db_migrate(&cli.serve).await
        }
        Some(Command::Serve) | None => run_server(cli.serve).await,
    }
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config.clone() {
        loader = loader.with_config_path(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    init_tracing(&config.logging.level);

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(
                    message = %warning.message,
                    hint = %hint,
                    "configuration warning"
                )
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    Ok(config)
}

async fn connect_database(config: &Config) -> anyhow::Result<PgPool> {
    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL must be provided for PostgreSQL connections")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;

    info!(
        max_connections = config.database.max_connections,
        "connected to PostgreSQL"
    );
    Ok(pool)
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let pool = connect_database(&config).await?;
    cirrus_core::MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;
    info!("database migrations applied successfully");
    Ok(())
}

fn build_flag_source(
    flags: &FlagsConfig,
) -> anyhow::Result<Arc<dyn FlagSource>> {
    match &flags.endpoint {
        Some(endpoint) => {
            let source = RelayFlagSource::new(endpoint.clone(), flags.timeout)
                .context("failed to build feature flag client")?;
            info!(
                endpoint = %endpoint,
                "feature flags evaluated by relay proxy"
            );
            Ok(Arc::new(source))
        }
        None => {
            info!(
                default_enabled = flags.default_enabled,
                overrides = flags.overrides.len(),
                "feature flags served from static configuration"
            );
            Ok(Arc::new(
                StaticFlagSource::new(flags.default_enabled)
                    .with_overrides(flags.overrides.clone()),
            ))
        }
    }
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;

    let catalog = ErrorCatalog::load(&config.catalog.path);
    info!(
        path = %config.catalog.path.display(),
        entries = catalog.len(),
        "error catalog ready"
    );

    let pool = connect_database(&config).await?;
    if config.database.run_migrations {
        cirrus_core::MIGRATOR
            .run(&pool)
            .await
            .context("database migration failed")?;
        info!("database schema up to date");
    }

    let repository: Arc<dyn AccountRepository> =
        Arc::new(PostgresAccountRepository::new(pool));
    let gate = FeatureGate::new(build_flag_source(&config.flags)?);

    let state = AppState::new(
        repository,
        gate,
        catalog,
        config.server.request_timeout,
        config.app_name.as_str(),
    );
    let app = routes::create_app(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, app = %config.app_name, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}
