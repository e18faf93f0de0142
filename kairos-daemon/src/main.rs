use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kairos_sync::{DirInventory, InstanceLock, SenderConfig, SyncError, TransferManager};

#[derive(Parser)]
#[command(name = "kairos-daemon")]
#[command(about = "Replication sender for immutable time-series files", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the sender configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => SenderConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SenderConfig::default(),
    };

    // At most one sender per host; a concurrent instance exits with 1.
    let _lock = match InstanceLock::acquire(&config.lock_file()) {
        Ok(lock) => lock,
        Err(SyncError::AlreadyRunning(path)) => {
            error!("sync sender is already running (lock held at {})", path.display());
            process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    info!("starting sender towards {}", config.receiver_addr());
    let mut manager = TransferManager::new(config, DirInventory).await?;
    info!("sender identity {}", manager.identity());

    let stop = manager.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            stop.stop();
        }
    });

    manager.run().await?;
    info!("sender shutdown complete");
    Ok(())
}
