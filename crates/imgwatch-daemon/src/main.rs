//! imgwatch Daemon
//!
//! Watches an image directory and serves its index over TCP.

use anyhow::{Context, Result};
use clap::Parser;
use imgwatch_core::DaemonConfig;
use imgwatch_daemon::Daemon;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// imgwatch daemon: keeps an index of the images in a directory
#[derive(Parser)]
#[command(name = "imgwatch-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.imgwatch/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to watch
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Resolve the config file, then apply flag overrides
    fn into_config(self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => DaemonConfig::load(),
        };

        if let Some(dir) = self.dir {
            config.watch_dir = dir;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        Ok(config)
    }
}

/// Run the daemon
async fn run(config: DaemonConfig) -> Result<()> {
    let daemon = Daemon::new(config)?;
    daemon.run().await
}

fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting imgwatch daemon v{}", env!("CARGO_PKG_VERSION"));

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}
