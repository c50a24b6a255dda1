//! Amp Link - console front end
//!
//! Runs the engine against a console transport that logs every device action and
//! plays the amp's part with a simulated device, with a REPL for issuing intents.

use amp_link::catalog::{load_default_catalog, FxCatalog};
use amp_link::cli;
use amp_link::config::AppConfig;
use amp_link::engine::{EngineActor, MirrorSnapshot};
use amp_link::paths::AppPaths;
use amp_link::storage::{DeviceStore, MemoryDeviceStore, SledDeviceStore};
use amp_link::tone::DevicePreset;
use amp_link::transport::{ConsoleTransport, DeviceInfo};
use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_PRESET_JSON: &str = include_str!("../assets/demo_preset.json");

/// Amp Link - keep a Bluetooth amp's live tone in sync
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the detected app config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// JSON effects catalog replacing the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut paths = AppPaths::detect();
    if let Some(config) = args.config.clone() {
        paths = paths.with_config(config);
    }
    paths.ensure_directories()?;

    let config = AppConfig::load_or_default(&paths.config).await?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let _log_guard = init_logging(&level, config.logging.file.then_some(paths.logs_dir.as_path()))?;

    info!("Starting Amp Link v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());

    let ids = config.device.normalizer();
    let catalog_path = args.catalog.clone().or_else(|| config.catalog.path.clone());
    let catalog = Arc::new(match catalog_path {
        Some(path) => FxCatalog::load_from_path(&path, ids.clone()).await?,
        None => load_default_catalog(ids.clone())?,
    });
    info!("Effects catalog: {} entries", catalog.len());

    let store = open_store(&paths);

    let demo: DevicePreset =
        serde_json::from_str(DEMO_PRESET_JSON).context("Failed to parse demo preset")?;
    let transport = Arc::new(ConsoleTransport::new("console").with_simulated_device(
        demo,
        vec![
            DeviceInfo::new("Spark 40", "F7:EB:ED:2C:DF:01"),
            DeviceInfo::new("Spark 40 (studio)", "F7:EB:ED:2C:DF:02"),
        ],
    ));
    let injector = transport.injector();

    let engine = EngineActor::spawn(
        transport,
        store,
        catalog,
        ids,
        config.engine.to_engine_config(),
    )?;

    let watcher = tokio::spawn(watch_mirror(WatchStream::new(engine.subscribe())));

    cli::run_repl(engine.clone(), injector, shutdown_signal()).await?;

    engine.shutdown().await;
    watcher.abort();

    info!("Amp Link shutdown complete");
    Ok(())
}

/// sled store in the state directory, or an in-memory one if it cannot be opened
fn open_store(paths: &AppPaths) -> Arc<dyn DeviceStore> {
    match SledDeviceStore::open(paths.sled_db_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Device store unavailable, devices will not be remembered: {:#}", e);
            Arc::new(MemoryDeviceStore::new())
        }
    }
}

/// Print a line whenever the visible device state changes
async fn watch_mirror(mut snapshots: WatchStream<MirrorSnapshot>) {
    let mut last = String::new();
    while let Some(snapshot) = snapshots.next().await {
        let summary = format!(
            "{:?} | channel {} | {} | {} device(s){}",
            snapshot.connection.state,
            snapshot
                .selected_channel
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            snapshot
                .tone
                .as_ref()
                .map(|t| t.name.as_str())
                .unwrap_or("no preset"),
            snapshot.devices.len(),
            if snapshot.scan_in_progress { " (scanning)" } else { "" }
        );
        if summary != last {
            println!("{} {}", "●".green(), summary.dimmed());
            last = summary;
        }
    }
}

fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {}", level))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "amp-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
