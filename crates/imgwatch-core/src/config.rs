//! Configuration for the imgwatch daemon.

use crate::CoreError;
use imgwatch_indexer::WatcherOptions;
use imgwatch_ipc::MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Address the daemon listens on when nothing else is configured
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Room left in a frame for the request envelope around upload bytes
const FRAME_OVERHEAD: usize = 1024 * 1024;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// TCP address for the request server
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Directory whose images are indexed
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Quiet period before filesystem events are delivered
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Largest accepted upload in bytes (default: 32MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// PID file path
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024 // 32MB
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/imgwatch.pid")
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            watch_dir: default_watch_dir(),
            debounce_ms: default_debounce_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            log_level: default_log_level(),
            pid_file: default_pid_file(),
        }
    }
}

impl DaemonConfig {
    /// Per-user data directory (`~/.imgwatch`)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".imgwatch")
    }

    /// Load `~/.imgwatch/config.yaml`, falling back to defaults
    pub fn load() -> Self {
        let config_path = Self::data_dir().join("config.yaml");

        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Ignoring config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.listen_addr.trim().is_empty() {
            return Err(CoreError::InvalidConfig(
                "listen_addr must not be empty".to_string(),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(CoreError::InvalidConfig(
                "max_upload_bytes must be positive".to_string(),
            ));
        }

        // Bytes travel as a MessagePack array, up to two bytes per byte
        let ceiling = (MAX_MESSAGE_SIZE - FRAME_OVERHEAD) / 2;
        if self.max_upload_bytes > ceiling {
            return Err(CoreError::InvalidConfig(format!(
                "max_upload_bytes must be at most {} bytes",
                ceiling
            )));
        }

        Ok(())
    }

    /// Watcher settings derived from this config
    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            debounce_duration: Duration::from_millis(self.debounce_ms),
            ..Default::default()
        }
    }
}
