//! Concurrency-safe image index.

use crate::metadata::ImageEntry;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Mapping from base file name to image metadata.
///
/// Readers take a shared lock only for the duration of a copy; every
/// mutation holds the exclusive lock for a single insert or delete.
#[derive(Debug, Default)]
pub struct ImageIndex {
    entries: RwLock<HashMap<String, ImageEntry>>,
}

impl ImageIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of all entries, in no particular order.
    pub fn snapshot(&self) -> Vec<ImageEntry> {
        self.entries.read().values().cloned().collect()
    }

    /// Insert or replace the entry keyed by its name.
    ///
    /// Returns the entry that was replaced, if any.
    pub fn upsert(&self, entry: ImageEntry) -> Option<ImageEntry> {
        self.entries.write().insert(entry.name.clone(), entry)
    }

    /// Remove the entry with the given name, if present.
    pub fn remove(&self, name: &str) -> Option<ImageEntry> {
        self.entries.write().remove(name)
    }

    /// Look up a single entry.
    pub fn get(&self, name: &str) -> Option<ImageEntry> {
        self.entries.read().get(name).cloned()
    }

    /// Replace the whole contents under one write lock.
    ///
    /// Later entries win when names repeat.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = ImageEntry>) {
        let map: HashMap<_, _> = entries
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();
        *self.entries.write() = map;
    }

    /// Number of indexed images.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
