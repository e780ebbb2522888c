//! Initial directory scan.
//!
//! Lists the immediate entries of a directory and extracts metadata for
//! every regular file. Subdirectories are not traversed.

use crate::metadata::{self, ImageEntry};
use crate::IndexerError;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of scanning a directory.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Successfully extracted images
    pub entries: Vec<ImageEntry>,
    /// Number of files dropped (not an image, unreadable)
    pub skipped: usize,
    /// Scan duration in milliseconds
    pub duration_ms: u64,
}

/// Scan `dir` once and return every file recognized as an image.
///
/// Fails only when the directory itself cannot be listed.
pub fn scan_dir(dir: &Path) -> Result<ScanResult, IndexerError> {
    let start = Instant::now();

    let read_dir = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        ErrorKind::NotFound => IndexerError::NotFound(dir.to_path_buf()),
        _ => IndexerError::Io(e),
    })?;

    let mut entries = Vec::new();
    let mut skipped = 0;

    for dirent in read_dir {
        let dirent = match dirent {
            Ok(d) => d,
            Err(e) => {
                warn!(dir = ?dir, error = %e, "Failed to read directory entry");
                skipped += 1;
                continue;
            }
        };

        let path = dirent.path();

        // file_type() does not follow symlinks; extract() does, so a link to
        // an image is indexed under the link's name.
        match dirent.file_type() {
            Ok(ft) if ft.is_dir() => continue,
            Ok(_) => {}
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat entry");
                skipped += 1;
                continue;
            }
        }

        match metadata::extract(&path) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {
                debug!(path = ?path, "Skipping non-image file");
                skipped += 1;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to extract image metadata");
                skipped += 1;
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let duration_ms = start.elapsed().as_millis() as u64;

    info!(
        path = ?dir,
        images = entries.len(),
        skipped = skipped,
        duration_ms = duration_ms,
        "Scan complete"
    );

    Ok(ScanResult {
        entries,
        skipped,
        duration_ms,
    })
}
