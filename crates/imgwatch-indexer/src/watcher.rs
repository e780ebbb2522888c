//! Directory change notifications.
//!
//! Uses inotify on Linux and FSEvents on macOS through `notify`, with
//! debouncing to collapse bursts. A create is reported one debounce window
//! after the file appears, which may be before its writer is done, so a
//! close-after-write is reported as another create. Only the watched
//! directory itself is observed.

use crate::IndexerError;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer_opt, DebounceEventResult, Debouncer, FileIdMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Classified change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File appeared (created, or moved into the directory)
    Created,
    /// File was deleted
    Removed,
    /// File was moved away from this path
    Renamed,
    /// Events were lost; the directory must be listed again
    Rescan,
    /// Anything else (content writes, metadata, access)
    Other,
}

/// A directory change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Affected path
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Options for the change notifier.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Debounce duration
    pub debounce_duration: Duration,
    /// Events buffered before the OS watcher thread blocks
    pub channel_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(100),
            channel_capacity: 1000,
        }
    }
}

/// A live subscription to change events for one directory.
///
/// Events start buffering as soon as `subscribe` returns. Dropping the
/// notifier releases the OS watch; once released, `next` drains what is
/// buffered and then returns `None`.
pub struct ChangeNotifier {
    root: PathBuf,
    rx: mpsc::Receiver<FileChange>,
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl ChangeNotifier {
    /// Start watching `path` (non-recursively).
    pub fn subscribe(path: &Path, options: &WatcherOptions) -> Result<Self, IndexerError> {
        let root = path.canonicalize().map_err(|e| match e.kind() {
            ErrorKind::NotFound => IndexerError::NotFound(path.to_path_buf()),
            _ => IndexerError::Io(e),
        })?;
        if !root.is_dir() {
            return Err(IndexerError::NotADirectory(root));
        }

        let (tx, rx) = mpsc::channel(options.channel_capacity);
        let handler_root = root.clone();

        let mut debouncer = new_debouncer_opt::<_, RecommendedWatcher, FileIdMap>(
            options.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for change in convert_event(&event.event, &handler_root) {
                            // Receiver gone means the subscription is over.
                            if tx.blocking_send(change).is_err() {
                                debug!("Change receiver closed, dropping events");
                                return;
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
            FileIdMap::new(),
            notify::Config::default(),
        )?;

        debouncer.watch(&root, RecursiveMode::NonRecursive)?;

        info!(path = ?root, "Started watching");

        Ok(Self {
            root,
            rx,
            _debouncer: debouncer,
        })
    }

    /// Canonical path of the watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receive the next change event.
    pub async fn next(&mut self) -> Option<FileChange> {
        self.rx.recv().await
    }
}

/// Convert a notify Event into zero or more changes, in order.
fn convert_event(event: &Event, root: &Path) -> Vec<FileChange> {
    if event.need_rescan() {
        warn!(path = ?root, "Watcher lost events, rescan required");
        return vec![FileChange::new(root, ChangeKind::Rescan)];
    }

    let changes = match &event.kind {
        EventKind::Create(CreateKind::Folder) => vec![],
        EventKind::Create(_) => first_path(event, ChangeKind::Created),
        // Writer finished; the create may have been seen while still empty
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            first_path(event, ChangeKind::Created)
        }
        EventKind::Remove(_) => first_path(event, ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => first_path(event, ChangeKind::Renamed),
            RenameMode::To => first_path(event, ChangeKind::Created),
            RenameMode::Both => match event.paths.as_slice() {
                [from, to, ..] => vec![
                    FileChange::new(from, ChangeKind::Renamed),
                    FileChange::new(to, ChangeKind::Created),
                ],
                _ => vec![],
            },
            // Backends that cannot tell the two sides apart
            _ => match event.paths.first() {
                Some(p) if p.exists() => vec![FileChange::new(p, ChangeKind::Created)],
                Some(p) => vec![FileChange::new(p, ChangeKind::Renamed)],
                None => vec![],
            },
        },
        _ => first_path(event, ChangeKind::Other),
    };

    changes
        .into_iter()
        .filter(|c| c.path != root)
        .inspect(|c| debug!(path = ?c.path, kind = ?c.kind, "File change detected"))
        .collect()
}

fn first_path(event: &Event, kind: ChangeKind) -> Vec<FileChange> {
    event
        .paths
        .first()
        .map(|p| vec![FileChange::new(p, kind)])
        .unwrap_or_default()
}
