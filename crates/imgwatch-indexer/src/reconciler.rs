//! Applies directory change events to the image index.

use crate::index::ImageIndex;
use crate::metadata::{self, base_name};
use crate::scanner::scan_dir;
use crate::watcher::{ChangeKind, ChangeNotifier, FileChange};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Outcome of applying a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Entry inserted or replaced
    Upserted,
    /// Entry deleted
    Removed,
    /// Index rebuilt from a fresh directory listing
    Rescanned,
    /// Event handled but the index was left untouched
    Skipped,
    /// Event kind carries no index meaning
    Ignored,
}

/// Counters for events processed by a reconciler.
#[derive(Debug, Default)]
pub struct ReconcileStats {
    /// Total events received
    pub events: AtomicU64,
    /// Entries inserted or replaced
    pub upserts: AtomicU64,
    /// Entries deleted
    pub removals: AtomicU64,
    /// Created events that failed extraction, removes of unknown names
    pub skips: AtomicU64,
    /// Full rescans after lost events
    pub rescans: AtomicU64,
}

impl ReconcileStats {
    /// Events that changed the index.
    pub fn applied(&self) -> u64 {
        self.upserts.load(Ordering::Relaxed)
            + self.removals.load(Ordering::Relaxed)
            + self.rescans.load(Ordering::Relaxed)
    }

    fn record(&self, applied: Applied) {
        self.events.fetch_add(1, Ordering::Relaxed);
        let counter = match applied {
            Applied::Upserted => &self.upserts,
            Applied::Removed => &self.removals,
            Applied::Rescanned => &self.rescans,
            Applied::Skipped => &self.skips,
            Applied::Ignored => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Single consumer of a change stream, mutating the index one event at a time.
pub struct Reconciler {
    index: Arc<ImageIndex>,
    stats: Arc<ReconcileStats>,
}

impl Reconciler {
    pub fn new(index: Arc<ImageIndex>, stats: Arc<ReconcileStats>) -> Self {
        Self { index, stats }
    }

    /// Apply one change to the index.
    ///
    /// Per-file failures are logged and never returned.
    pub fn apply(&self, change: &FileChange) -> Applied {
        let applied = match change.kind {
            ChangeKind::Created => self.add(change),
            ChangeKind::Removed | ChangeKind::Renamed => self.remove(change),
            ChangeKind::Rescan => self.rescan(change),
            ChangeKind::Other => Applied::Ignored,
        };
        self.stats.record(applied);
        applied
    }

    fn add(&self, change: &FileChange) -> Applied {
        match metadata::extract(&change.path) {
            Ok(Some(entry)) => {
                debug!(name = %entry.name, width = entry.width, height = entry.height, "Adding image");
                self.index.upsert(entry);
                Applied::Upserted
            }
            Ok(None) => {
                debug!(path = ?change.path, "Created file is not an image");
                Applied::Skipped
            }
            Err(e) => {
                warn!(path = ?change.path, error = %e, "Failed to load image");
                Applied::Skipped
            }
        }
    }

    fn remove(&self, change: &FileChange) -> Applied {
        let Some(name) = base_name(&change.path) else {
            return Applied::Skipped;
        };

        if self.index.remove(&name).is_some() {
            debug!(name = %name, kind = ?change.kind, "Removed image");
            Applied::Removed
        } else {
            Applied::Skipped
        }
    }

    /// Rebuild the index from the directory at `change.path`.
    ///
    /// On failure the index keeps its current contents.
    fn rescan(&self, change: &FileChange) -> Applied {
        match scan_dir(&change.path) {
            Ok(scan) => {
                info!(path = ?change.path, images = scan.entries.len(), "Rescanned directory");
                self.index.replace_all(scan.entries);
                Applied::Rescanned
            }
            Err(e) => {
                warn!(path = ?change.path, error = %e, "Rescan failed");
                Applied::Skipped
            }
        }
    }

    /// Drain `notifier` until it closes or `stop` fires.
    ///
    /// The notifier is dropped on return, releasing the OS watch. A dropped
    /// stop sender counts as a stop request.
    pub async fn run(self, mut notifier: ChangeNotifier, mut stop: oneshot::Receiver<()>) {
        info!(path = ?notifier.root(), "Reconciler started");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    info!("Reconciler stop requested");
                    break;
                }
                change = notifier.next() => match change {
                    Some(change) => {
                        self.apply(&change);
                    }
                    None => {
                        info!("Change stream closed");
                        break;
                    }
                },
            }
        }

        drop(notifier);

        info!(
            events = self.stats.events.load(Ordering::Relaxed),
            applied = self.stats.applied(),
            "Reconciler stopped"
        );
    }
}
