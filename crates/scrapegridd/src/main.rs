//! scrapegridd — the scrapegrid coordinator daemon.
//!
//! Assembles the coordinator from the config file:
//! - Static discovery over `[[jobs]]`
//! - Static shard pool over `[[shards]]`
//! - Target explorer + HTTP scraper
//! - Reconcile loop
//! - Read API
//!
//! # Usage
//!
//! ```text
//! scrapegridd run --config /etc/scrapegrid/scrapegrid.toml
//! scrapegridd check --config scrapegrid.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use scrapegrid_coordinator::{ConfigStore, Coordinator, Reloader, StaticDiscovery, StaticShardManager};
use scrapegrid_core::LoadedConfig;
use scrapegrid_explore::{Explorer, HttpScraper, Scraper};

/// Per-request timeout for shard RPCs.
const SHARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "scrapegridd", about = "scrapegrid coordinator daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator and its API.
    Run {
        /// Path to scrapegrid.toml.
        #[arg(long, short)]
        config: PathBuf,
    },
    /// Validate a config file and print the derived options.
    Check {
        /// Path to scrapegrid.toml.
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run { config } => run(&config).await,
        Command::Check { config } => check(&config),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,scrapegrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn check(path: &Path) -> anyhow::Result<()> {
    let loaded = LoadedConfig::from_file(path)?;
    let options = loaded.options()?;
    let targets: usize = loaded.config.jobs.iter().map(|j| j.targets.len()).sum();

    println!("config ok: {}", path.display());
    println!("  hash:                 {}", loaded.hash);
    println!("  max_series_per_shard: {}", options.max_series_per_shard);
    println!("  max_shard_count:      {}", options.max_shard_count);
    println!("  max_idle:             {:?}", options.max_idle);
    println!("  reconcile_interval:   {:?}", options.reconcile_interval);
    println!("  shards:               {}", loaded.config.shards.len());
    println!("  jobs:                 {} ({targets} static targets)", loaded.config.jobs.len());
    Ok(())
}

async fn run(path: &Path) -> anyhow::Result<()> {
    info!(config = %path.display(), "scrapegrid coordinator starting");

    let loaded = LoadedConfig::from_file(path)?;
    let listen = loaded.config.api.listen;
    let concurrency = loaded.config.explore.concurrency;
    info!(hash = %loaded.hash, "configuration loaded");

    // ── Initialize subsystems ──────────────────────────────────

    let discovery = Arc::new(StaticDiscovery::from_config(&loaded.config)?);
    let manager = Arc::new(StaticShardManager::from_config(&loaded.config, SHARD_TIMEOUT)?);
    info!(configured = manager.configured_count(), "shard pool initialized");

    let scraper = Arc::new(HttpScraper::new());
    scraper.apply_config(&loaded.config)?;
    let explorer = Explorer::new(
        scraper,
        loaded.config.explore.queue_size,
        loaded.config.explore.retry_interval()?,
    );

    let store = ConfigStore::new(loaded);
    let coordinator = Arc::new(Coordinator::new(
        manager,
        discovery.clone(),
        explorer.clone(),
        store.clone(),
    )?);
    let reloader = Arc::new(Reloader::new(path, store, discovery, explorer.clone()));

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let explore_shutdown = shutdown_rx.clone();
    let explore_handle = tokio::spawn(async move {
        explorer.run(concurrency, explore_shutdown).await;
    });

    let coordinator_loop = coordinator.clone();
    let coordinator_handle = tokio::spawn(async move {
        coordinator_loop.run(shutdown_rx).await;
    });

    // ── API server ─────────────────────────────────────────────

    let router = scrapegrid_api::build_router(coordinator, reloader);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "API server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = explore_handle.await;
    let _ = coordinator_handle.await;

    info!("scrapegrid coordinator stopped");
    Ok(())
}
