//! imgwatch Daemon
//!
//! Background process that keeps an image index in sync with a directory
//! and answers requests about it over TCP.

mod daemon;
mod handler;
mod signals;

pub use daemon::Daemon;
pub use handler::DaemonHandler;
