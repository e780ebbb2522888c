//! Watch lifecycle for a single image directory.
//!
//! `ImageService` ties the pieces together: subscribe to changes, scan,
//! then hand the subscription to a background reconciler task that it owns
//! until `stop`.

use crate::index::ImageIndex;
use crate::metadata::ImageEntry;
use crate::reconciler::{ReconcileStats, Reconciler};
use crate::scanner::scan_dir;
use crate::watcher::{ChangeNotifier, WatcherOptions};
use crate::IndexerError;
use parking_lot::RwLock;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Span};

/// The running reconciler and the means to stop it.
struct WatchHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Keeps an in-memory image index in sync with a watched directory.
pub struct ImageService {
    span: Span,
    index: Arc<ImageIndex>,
    stats: Arc<ReconcileStats>,
    watch_dir: RwLock<Option<PathBuf>>,
    handle: Mutex<Option<WatchHandle>>,
    #[cfg(test)]
    after_scan: parking_lot::Mutex<Option<Box<dyn FnOnce(&Path) + Send>>>,
}

impl ImageService {
    /// Create a service that logs under `span`.
    pub fn new(span: Span) -> Self {
        Self {
            span,
            index: Arc::new(ImageIndex::new()),
            stats: Arc::new(ReconcileStats::default()),
            watch_dir: RwLock::new(None),
            handle: Mutex::new(None),
            #[cfg(test)]
            after_scan: parking_lot::Mutex::new(None),
        }
    }

    /// Start watching `dir`.
    ///
    /// The change subscription is established before the directory is
    /// listed, so nothing created during the scan is missed. Returns once
    /// the initial scan is in the index and the reconciler is running.
    pub async fn watch(&self, dir: &Path, options: &WatcherOptions) -> Result<(), IndexerError> {
        let span = self.span.clone();
        self.start(dir, options).instrument(span).await
    }

    async fn start(&self, dir: &Path, options: &WatcherOptions) -> Result<(), IndexerError> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            let current = self.watch_dir().unwrap_or_else(|| dir.to_path_buf());
            return Err(IndexerError::AlreadyWatching(current));
        }

        // Dropped on any early return below, which releases the watch.
        let notifier = ChangeNotifier::subscribe(dir, options)?;
        let root = notifier.root().to_path_buf();

        let scan_root = root.clone();
        let scan = tokio::task::spawn_blocking(move || scan_dir(&scan_root))
            .await
            .map_err(|e| IndexerError::Io(std::io::Error::other(e)))??;

        #[cfg(test)]
        if let Some(hook) = self.after_scan.lock().take() {
            hook(&root);
        }

        let scanned = scan.entries.len();
        self.index.replace_all(scan.entries);
        *self.watch_dir.write() = Some(root.clone());

        let (stop_tx, stop_rx) = oneshot::channel();
        let reconciler = Reconciler::new(self.index.clone(), self.stats.clone());
        let task = tokio::spawn(reconciler.run(notifier, stop_rx).instrument(self.span.clone()));

        *handle = Some(WatchHandle { stop_tx, task });

        info!(path = ?root, images = scanned, "Watching directory");
        Ok(())
    }

    /// Stop watching. Idempotent; the index keeps its last state.
    pub async fn stop(&self) {
        let Some(WatchHandle { stop_tx, task }) = self.handle.lock().await.take() else {
            return;
        };

        self.span.in_scope(|| info!("Stopping image service"));

        // The task may already have ended on a closed stream.
        let _ = stop_tx.send(());
        if let Err(e) = task.await {
            self.span
                .in_scope(|| warn!(error = %e, "Reconciler task failed"));
        }
    }

    /// Whether a reconciler is currently attached.
    pub async fn is_watching(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// Current index snapshot, sorted by name.
    pub fn files(&self) -> Vec<ImageEntry> {
        let mut files = self.index.snapshot();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Look up one indexed image by name.
    pub fn get(&self, name: &str) -> Option<ImageEntry> {
        self.index.get(name)
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Canonical path of the watched directory, once `watch` has succeeded.
    pub fn watch_dir(&self) -> Option<PathBuf> {
        self.watch_dir.read().clone()
    }

    /// Reconciler counters.
    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }
}

impl Default for ImageService {
    fn default() -> Self {
        Self::new(tracing::info_span!("image_service"))
    }
}

impl Drop for ImageService {
    fn drop(&mut self) {
        // Make sure the reconciler does not outlive its owner.
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.stop_tx.send(());
        }
    }
}

/// Check that `name` is a bare file name with no directory component.
pub fn validate_name(name: &str) -> Result<&str, IndexerError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(n)), None) if n == name => Ok(name),
        _ => Err(IndexerError::InvalidName(name.to_string())),
    }
}
