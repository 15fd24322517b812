//! ReadSplit - Read/Write Splitting Data Access Layer
//!
//! Bootstraps master/replica replication, then serves the blog API with
//! writes on the master and cached round-robin reads on the replicas.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readsplit::api::{AppState, HttpServer};
use readsplit::cache::CacheLayer;
use readsplit::config::{Config, LoggingConfig};
use readsplit::endpoint::{Endpoint, EndpointRegistry, MemoryEndpoint};
use readsplit::error::{Error, Result};
use readsplit::replication::{BootstrapReport, BootstrapSettings, ReplicationBootstrapper};

/// ReadSplit - read/write splitting over MariaDB replication
#[derive(Parser)]
#[command(name = "readsplit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "readsplit.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap replication, then serve the HTTP API
    Start {
        /// Serve immediately without running the bootstrap sequence
        #[arg(long)]
        skip_bootstrap: bool,

        /// Use in-process endpoints instead of MariaDB (for local testing)
        #[arg(long)]
        in_memory: bool,
    },

    /// Run the replication bootstrap sequence once and exit
    Bootstrap,

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "readsplit.toml")]
        output: PathBuf,
    },

    /// Query a running instance
    Status {
        /// Instance address (host:port)
        #[arg(short, long, default_value = "localhost:3000")]
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { skip_bootstrap, in_memory } => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_start(config, skip_bootstrap, in_memory).await
        }
        Commands::Bootstrap => {
            let config = load_config(&cli.config, cli.log_level.as_deref())?;
            run_bootstrap(config).await
        }
        Commands::Validate => run_validate(cli.config),
        Commands::Init { output } => run_init(output),
        Commands::Status { address } => run_status(address).await,
    }
}

/// Load configuration and initialize logging from it
fn load_config(path: &Path, level_override: Option<&str>) -> Result<Config> {
    match Config::from_file(path) {
        Ok(config) => {
            init_logging(&config.logging, level_override);
            tracing::info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Err(e) => {
            init_logging(&LoggingConfig::default(), level_override);
            tracing::error!("Failed to load configuration from {:?}: {}", path, e);
            tracing::error!("Run `readsplit init` to create a sample configuration");
            Err(e)
        }
    }
}

/// Initialize logging
fn init_logging(logging: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(logging.level.as_str());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Endpoints for the configured topology
fn build_registry(config: &Config, in_memory: bool) -> Result<Arc<EndpointRegistry>> {
    if !in_memory {
        return Ok(Arc::new(EndpointRegistry::from_config(config)?));
    }

    tracing::warn!("Using in-memory endpoints; data will not be persisted");
    let master = MemoryEndpoint::new(config.master.name(), config.master.database.clone());
    let replicas = config
        .replicas
        .iter()
        .map(|r| Arc::new(MemoryEndpoint::replica_of(&master, r.name())) as Arc<dyn Endpoint>)
        .collect();
    Ok(Arc::new(EndpointRegistry::new(Arc::new(master), replicas)?))
}

fn log_report(report: &BootstrapReport) {
    for (step, outcome) in &report.steps {
        tracing::info!("  {:<26} {:?}", step.to_string(), outcome);
    }
    match &report.position {
        Some(position) => tracing::info!("  Replicas start from {}", position),
        None => tracing::warn!("  No master log position was captured"),
    }
}

/// Bootstrap replication, then serve
async fn run_start(config: Config, skip_bootstrap: bool, in_memory: bool) -> Result<()> {
    tracing::info!("Starting ReadSplit...");
    tracing::info!(
        "Master {} ({}:{}), {} replicas",
        config.master.name(),
        config.master.host,
        config.master.port,
        config.replicas.len()
    );

    let registry = build_registry(&config, in_memory)?;

    if skip_bootstrap {
        tracing::warn!("Skipping replication bootstrap");
    } else {
        // Must finish before the first request is accepted
        let report = ReplicationBootstrapper::new(
            Arc::clone(&registry),
            BootstrapSettings::from_config(&config),
        )
        .run()
        .await;
        log_report(&report);
    }

    let cache = Arc::new(CacheLayer::new(config.cache_ttl()));
    tracing::info!("Read cache TTL: {:?}", cache.ttl());

    let state = AppState::new(Arc::clone(&registry), cache)?;
    let http_server = HttpServer::new(config.server.clone(), state);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    let served = http_server.start(shutdown).await;
    registry.close_all().await;

    if let Err(e) = served {
        tracing::error!("HTTP server error: {}", e);
        return Err(e);
    }

    tracing::info!("ReadSplit stopped");
    Ok(())
}

/// Run bootstrap only
async fn run_bootstrap(config: Config) -> Result<()> {
    let registry = build_registry(&config, false)?;
    let report = ReplicationBootstrapper::new(
        Arc::clone(&registry),
        BootstrapSettings::from_config(&config),
    )
    .run()
    .await;
    registry.close_all().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_degraded() {
        return Err(Error::Replication("bootstrap finished in degraded state".into()));
    }
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    if output.exists() {
        eprintln!("✗ {} already exists, refusing to overwrite", output.display());
        return Err(Error::Config(format!("{} already exists", output.display())));
    }

    std::fs::write(&output, Config::sample())?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your master and replicas.");
    println!("Then start with: readsplit --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match Config::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!(
                "  Master:       {} ({}@{}:{}/{})",
                config.master.name(),
                config.master.user,
                config.master.host,
                config.master.port,
                config.master.database
            );
            for (i, replica) in config.replicas.iter().enumerate() {
                println!(
                    "  Replica {}:    {} ({}:{}/{})",
                    i + 1,
                    replica.name(),
                    replica.host,
                    replica.port,
                    replica.database
                );
            }
            println!("  Replication:  user {}", config.replication.user);
            println!("  Cache TTL:    {} s", config.cache.ttl_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Query health and replica status of a running instance
async fn run_status(address: String) -> Result<()> {
    for path in ["health", "replicas"] {
        let url = format!("http://{}/{}", address, path);

        match reqwest::get(&url).await {
            Ok(response) => {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| Error::Network(e.to_string()))?;
                println!("{}:", path);
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
            Err(e) => {
                eprintln!("Failed to get {}: {}", path, e);
                return Err(Error::Network(e.to_string()));
            }
        }
    }
    Ok(())
}
