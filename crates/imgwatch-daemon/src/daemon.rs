//! Daemon lifecycle management.

use anyhow::{Context, Result};
use imgwatch_core::DaemonConfig;
use imgwatch_indexer::ImageService;
use imgwatch_ipc::IpcServer;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::handler::DaemonHandler;
use crate::signals;

/// The main daemon process
pub struct Daemon {
    config: DaemonConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new(config: DaemonConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            shutdown_tx,
        })
    }

    /// Sender that triggers a graceful shutdown of `run`
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Run the daemon until a shutdown signal arrives
    pub async fn run(&self) -> Result<()> {
        let shutdown_rx = self.shutdown_tx.subscribe();

        // Check single instance
        self.acquire_pid_lock()?;

        tracing::info!(
            listen = %self.config.listen_addr,
            dir = %self.config.watch_dir.display(),
            "Daemon starting"
        );

        let service = Arc::new(ImageService::new(tracing::info_span!(
            "image_service",
            dir = %self.config.watch_dir.display()
        )));

        service
            .watch(&self.config.watch_dir, &self.config.watcher_options())
            .await
            .with_context(|| {
                format!(
                    "Failed to watch directory {}",
                    self.config.watch_dir.display()
                )
            })?;

        let handler = Arc::new(DaemonHandler::new(
            service.clone(),
            self.shutdown_tx.clone(),
            self.config.max_upload_bytes,
        ));

        let ipc_server = match IpcServer::bind(self.config.listen_addr.as_str(), handler).await {
            Ok(server) => server,
            Err(e) => {
                service.stop().await;
                return Err(e).context("Failed to start IPC server");
            }
        };

        tokio::select! {
            result = ipc_server.run() => {
                if let Err(e) = result {
                    tracing::error!("IPC server error: {}", e);
                }
            }
            _ = signals::wait_for_shutdown(shutdown_rx) => {
                tracing::info!("Shutdown signal received");
            }
        }

        // The reconciler must be gone before the process exits
        service.stop().await;

        self.cleanup().await?;

        Ok(())
    }

    /// Acquire PID lock to ensure single instance
    fn acquire_pid_lock(&self) -> Result<()> {
        let pid_file = &self.config.pid_file;

        if pid_file.exists() {
            if let Ok(pid_str) = std::fs::read_to_string(pid_file) {
                if let Ok(pid) = pid_str.trim().parse::<u32>() {
                    if is_process_running(pid) {
                        anyhow::bail!("Daemon already running (PID: {})", pid);
                    }
                }
            }
            // Stale PID file, remove it
            std::fs::remove_file(pid_file)
                .with_context(|| format!("Failed to remove stale {}", pid_file.display()))?;
        }

        if let Some(parent) = pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(pid_file, std::process::id().to_string())
            .with_context(|| format!("Failed to write {}", pid_file.display()))?;

        tracing::debug!(pid = std::process::id(), "PID lock acquired");

        Ok(())
    }

    /// Cleanup resources on shutdown
    async fn cleanup(&self) -> Result<()> {
        tracing::info!("Cleaning up...");

        if self.config.pid_file.exists() {
            let _ = std::fs::remove_file(&self.config.pid_file);
        }

        tracing::info!("Cleanup complete");

        Ok(())
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        // Only remove the PID file if it is ours
        let ours = std::fs::read_to_string(&self.config.pid_file)
            .map(|pid| pid.trim() == std::process::id().to_string())
            .unwrap_or(false);
        if ours {
            let _ = std::fs::remove_file(&self.config.pid_file);
        }
    }
}

/// Check if a process is running by PID
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid, 0) == 0 }
}
