//! Binary entry point for priceanalyzer.
//!
//! Runs the HTTP service or checks database connectivity.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use priceanalyzer::config::ServerConfig;
use priceanalyzer::observability::{self, LogFormat, LoggingConfig};
use priceanalyzer::server;
use priceanalyzer::services::IngestionService;
use priceanalyzer::storage::{InMemoryPriceStore, PriceStore};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Priceanalyzer - archive-transparent price-list ingestion.
#[derive(Parser)]
#[command(name = "priceanalyzer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Persistence backend.
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Postgres)]
    store: StoreKind,

    /// PostgreSQL DSN (overrides `DATABASE_URI`).
    #[arg(short = 'd', long, global = true)]
    database_uri: Option<String>,

    /// Log filter directive (overrides `LOG_LEVEL`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (overrides `LOG_FORMAT`).
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve {
        /// Listen address (overrides `RUN_ADDRESS`).
        #[arg(short, long)]
        address: Option<SocketAddr>,
    },

    /// Check database connectivity and exit.
    Ping,
}

/// Persistence backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// PostgreSQL (requires a DSN).
    Postgres,
    /// Non-persistent in-memory store.
    Memory,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::new(&config.log_level, config.log_format, cli.verbose);
    if let Err(e) = observability::init(logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Layers command-line flags over file and environment settings.
fn load_config(cli: &Cli) -> Result<ServerConfig> {
    let mut config = ServerConfig::load(cli.config.as_deref())?;

    if let Some(uri) = &cli.database_uri {
        config = config.with_database_dsn(SecretString::from(uri.clone()));
    }
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level.clone());
    }
    if let Some(format) = &cli.log_format {
        config = config.with_log_format(format.parse::<LogFormat>()?);
    }
    if let Commands::Serve {
        address: Some(address),
    } = &cli.command
    {
        config = config.with_run_address(*address);
    }

    config.validate()?;
    Ok(config)
}

/// Runs the selected command.
async fn run(cli: Cli, config: ServerConfig) -> Result<ExitCode> {
    let store = open_store(cli.store, &config).await?;
    let service = Arc::new(
        IngestionService::builder()
            .store(store)
            .store_timeout(config.store_timeout)
            .ping_timeout(config.ping_timeout)
            .build()?,
    );

    match cli.command {
        Commands::Serve { .. } => {
            cmd_serve(&config, Arc::clone(&service)).await?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Ping => Ok(cmd_ping(&service).await),
    }
}

/// Opens the selected persistence backend.
async fn open_store(kind: StoreKind, config: &ServerConfig) -> Result<Arc<dyn PriceStore>> {
    match kind {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store, data is lost on exit");
            Ok(Arc::new(InMemoryPriceStore::new()))
        },
        StoreKind::Postgres => open_postgres(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &ServerConfig) -> Result<Arc<dyn PriceStore>> {
    use priceanalyzer::storage::PostgresPriceStore;

    let Some(dsn) = &config.database_dsn else {
        bail!("no database DSN: set DATABASE_URI, pass --database-uri, or use --store memory");
    };
    let store = PostgresPriceStore::connect(dsn, &config.table_name, config.pool_size)
        .await
        .context("failed to open PostgreSQL store")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &ServerConfig) -> Result<Arc<dyn PriceStore>> {
    bail!("built without the `postgres` feature; use --store memory")
}

/// Serves HTTP until Ctrl-C or SIGTERM, then closes the store.
async fn cmd_serve(config: &ServerConfig, service: Arc<IngestionService>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.run_address)
        .await
        .with_context(|| format!("failed to bind {}", config.run_address))?;

    tracing::info!(
        address = %config.run_address,
        backend = service.backend_name(),
        upload_limit = config.upload_limit,
        member_limit = config.member_limit,
        "Starting priceanalyzer"
    );

    let app = server::router(
        Arc::clone(&service),
        config.upload_limit,
        config.member_limit,
    );
    let result = server::serve(
        listener,
        app,
        server::shutdown_signal(),
        config.shutdown_grace,
    )
    .await;

    if service.close().await {
        tracing::info!("Store closed");
    }
    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Pings the store and reports the outcome through the exit code.
async fn cmd_ping(service: &IngestionService) -> ExitCode {
    let healthy = service.ping().await;
    service.close().await;
    if healthy {
        println!("ok");
        ExitCode::SUCCESS
    } else {
        eprintln!("unavailable");
        ExitCode::FAILURE
    }
}
