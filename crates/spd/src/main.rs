//! spd — the scaling policy derivation daemon.
//!
//! Assembles the SPD subsystems:
//! - Document store (redb)
//! - REST clients for the forecasting, profiling and scheduler components
//! - Planner (reconciliation, window derivation, strategies, evaluation)
//! - Periodic derivation loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! spd serve --config spd.toml --port 8083 --data-dir /var/lib/spd
//! spd derive --config spd.toml --prices prices.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use spd_clients::HttpSources;
use spd_core::{PriceModel, SystemConfiguration};
use spd_planner::{CycleOutcome, Planner};
use spd_state::StateStore;

#[derive(Parser)]
#[command(name = "spd", about = "Scaling policy derivation daemon")]
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
    /// Serve the REST API and derive policies periodically.
    Serve {
        /// System configuration file.
        #[arg(long, default_value = "spd.toml")]
        config: PathBuf,

        /// VM price table. Built-in prices are used when omitted.
        #[arg(long)]
        prices: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8083")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/spd")]
        data_dir: PathBuf,
    },
    /// Run a single derivation cycle and print the selected policy.
    Derive {
        #[arg(long, default_value = "spd.toml")]
        config: PathBuf,

        #[arg(long)]
        prices: Option<PathBuf>,

        #[arg(long, default_value = "/var/lib/spd")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,spd=debug"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    match cli.command {
        Command::Serve {
            config,
            prices,
            port,
            data_dir,
        } => run_serve(&config, prices.as_deref(), port, &data_dir).await,
        Command::Derive {
            config,
            prices,
            data_dir,
        } => run_derive(&config, prices.as_deref(), &data_dir).await,
    }
}

/// Load configuration and prices, open the store and assemble the planner.
/// Any failure here is a startup misconfiguration.
fn build_planner(
    config_path: &Path,
    prices_path: Option<&Path>,
    data_dir: &Path,
) -> anyhow::Result<(Planner, u64)> {
    let config = SystemConfiguration::from_file(config_path)?;
    info!(path = ?config_path, service = %config.main_service_name, "configuration loaded");

    let prices = PriceModel::load(prices_path)?;
    info!(vm_types = prices.prices.len(), "price model loaded");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join("spd.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let sources = Arc::new(HttpSources::new(&config));
    let interval = config.pulling_interval_secs;
    Ok((Planner::new(config, Arc::new(prices), store, sources), interval))
}

async fn run_serve(
    config_path: &Path,
    prices_path: Option<&Path>,
    port: u16,
    data_dir: &Path,
) -> anyhow::Result<()> {
    info!("SPD starting");

    let (planner, interval) = build_planner(config_path, prices_path, data_dir)?;
    let planner = Arc::new(planner);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Derivation loop ────────────────────────────────────────

    let loop_handle = tokio::spawn(
        planner
            .clone()
            .run(Duration::from_secs(interval), shutdown_rx),
    );

    // ── API server ─────────────────────────────────────────────

    let router = spd_api::build_router(planner);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = loop_handle.await;

    info!("SPD stopped");
    Ok(())
}

async fn run_derive(
    config_path: &Path,
    prices_path: Option<&Path>,
    data_dir: &Path,
) -> anyhow::Result<()> {
    let (planner, _) = build_planner(config_path, prices_path, data_dir)?;

    match planner.run_cycle().await? {
        CycleOutcome::Scheduled(policy) | CycleOutcome::ForecastUnchanged(Some(policy)) => {
            println!("{}", serde_json::to_string_pretty(&policy)?);
        }
        CycleOutcome::ForecastUnchanged(None) => info!("forecast unchanged, no policy stored"),
        CycleOutcome::NoScalingNeeded => info!("no scaling needed"),
    }
    Ok(())
}
