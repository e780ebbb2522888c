//! imgwatch Indexer
//!
//! This crate keeps an in-memory index of the images in a directory:
//! - Header-only image metadata extraction
//! - One-shot directory scan for the initial index
//! - Debounced directory change notifications
//! - A single-consumer reconciler that applies changes in order
//! - `ImageService`, which owns the watch and serves snapshots

mod error;
pub mod index;
pub mod metadata;
pub mod reconciler;
pub mod scanner;
pub mod service;
pub mod watcher;

pub use error::IndexerError;
pub use index::ImageIndex;
pub use metadata::{extract, extract_from_bytes, sniff, ImageEntry};
pub use reconciler::{Applied, ReconcileStats, Reconciler};
pub use scanner::{scan_dir, ScanResult};
pub use service::{validate_name, ImageService};
pub use watcher::{ChangeKind, ChangeNotifier, FileChange, WatcherOptions};
