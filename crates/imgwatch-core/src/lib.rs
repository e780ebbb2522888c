//! imgwatch Core Components
//!
//! Configuration and request metrics shared by the imgwatch daemon and CLI.

mod config;
mod error;
mod metrics;

pub use config::{DaemonConfig, DEFAULT_LISTEN_ADDR};
pub use error::CoreError;
pub use metrics::Metrics;
