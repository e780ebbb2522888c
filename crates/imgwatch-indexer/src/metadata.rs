//! Image metadata extraction.
//!
//! Determines whether a file is an image and reads its pixel dimensions
//! from the header alone. Pixel data is never decoded.

use crate::IndexerError;
use image::{ImageError, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::{Path, PathBuf};
use tracing::trace;

/// One indexed image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Base file name, the key within the index
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Absolute path used to re-open the file
    pub location: PathBuf,
}

impl ImageEntry {
    /// Build an entry whose name is the base name of `location`.
    ///
    /// Returns `None` when the location has no file name component.
    pub fn new(location: impl Into<PathBuf>, width: u32, height: u32) -> Option<Self> {
        let location = location.into();
        let name = base_name(&location)?;
        Some(Self {
            name,
            width,
            height,
            location,
        })
    }
}

/// Base name of a path as an owned string.
pub fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Extract metadata for the file at `path`.
///
/// `Ok(None)` means "not an image": not a regular file, unknown magic bytes,
/// or a header that does not decode. I/O failures are returned as errors.
pub fn extract(path: &Path) -> Result<Option<ImageEntry>, IndexerError> {
    let file = File::open(path)?;
    if !file.metadata()?.is_file() {
        return Ok(None);
    }

    let Some((width, height)) = dimensions(BufReader::new(file))? else {
        trace!(path = ?path, "Not an image");
        return Ok(None);
    };

    Ok(ImageEntry::new(path, width, height))
}

/// Extract metadata from in-memory bytes, naming the entry `location`.
pub fn extract_from_bytes(
    location: &Path,
    bytes: &[u8],
) -> Result<Option<ImageEntry>, IndexerError> {
    Ok(dimensions(Cursor::new(bytes))?.and_then(|(w, h)| ImageEntry::new(location, w, h)))
}

/// Guess the image format from leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Read dimensions from the header, classifying by content only.
fn dimensions<R: BufRead + Seek>(reader: R) -> Result<Option<(u32, u32)>, IndexerError> {
    let reader = ImageReader::new(reader).with_guessed_format()?;
    if reader.format().is_none() {
        return Ok(None);
    }

    match reader.into_dimensions() {
        Ok((0, _)) | Ok((_, 0)) => Ok(None),
        Ok(dims) => Ok(Some(dims)),
        // A header cut short is a corrupt image, not a failing disk.
        Err(ImageError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(ImageError::IoError(e)) => Err(IndexerError::Io(e)),
        Err(_) => Ok(None),
    }
}
