//! # Scanner Module
//!
//! Walks a directory and emits batches of [`FileIdentity`] into the pipeline.
//!
//! ## Supported Formats
//! - JPEG (.jpg, .jpeg)
//! - PNG (.png)
//! - BMP (.bmp)
//! - GIF (.gif)
//! - WebP (.webp)
//! - TIFF (.tiff, .tif)
//!
//! ## Example
//! ```rust,ignore
//! let scanner = DirectoryScanner::new(request, ScanConfig::default(), token, events);
//! spawn_stage(SourceStage::new(scanner, scan_queue))?;
//! ```

mod filter;
mod walker;

pub use filter::ImageFilter;
pub use walker::{DirectoryScanner, ScanConfig, ScanOutcome};

use crate::core::metadata::ExifData;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// A batch of identities shared between the scanner and downstream stages
pub type FileIdentityBatch = Arc<Vec<FileIdentity>>;

/// What the user asked to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub recursive: bool,
}

impl ScanRequest {
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
        }
    }

    /// The same request with an absolute root.
    ///
    /// Cache keys and the prune scope are built from the root, so they must
    /// not depend on the working directory. Symlinks are resolved when the
    /// root exists; a missing root is only made absolute.
    pub fn resolved(self) -> Self {
        let root = fs::canonicalize(&self.root)
            .or_else(|_| std::path::absolute(&self.root))
            .unwrap_or(self.root);
        Self {
            root,
            recursive: self.recursive,
        }
    }
}

/// Immutable identity of one file generation.
///
/// Used as the cache key and as the reference to the physical file for
/// the whole pipeline. Equality is structural, including EXIF.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    name: String,
    directory: PathBuf,
    extension: String,
    size: u64,
    modified: i64,
    exif: ExifData,
}

impl FileIdentity {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        extension: impl Into<String>,
        size: u64,
        modified: i64,
        exif: ExifData,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            extension: extension.into().to_lowercase(),
            size,
            modified,
            exif,
        }
    }

    /// Build an identity from the filesystem, reading size, mtime and EXIF.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let path = &std::path::absolute(path)?;
        let metadata = fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Self::new(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path.parent().map(Path::to_path_buf).unwrap_or_default(),
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            metadata.len(),
            modified,
            crate::core::metadata::read_exif(path),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lower-case extension without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last-modified time as Unix seconds
    pub fn modified(&self) -> i64 {
        self.modified
    }

    pub fn exif(&self) -> &ExifData {
        &self.exif
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    pub fn format(&self) -> ImageFormat {
        ImageFormat::from_extension(&self.extension)
    }
}

/// Supported image formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
    WebP,
    Tiff,
    Unknown,
}

impl ImageFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "bmp" => ImageFormat::Bmp,
            "gif" => ImageFormat::Gif,
            "webp" => ImageFormat::WebP,
            "tiff" | "tif" => ImageFormat::Tiff,
            _ => ImageFormat::Unknown,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ImageFormat::Unknown)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Gif => "GIF",
            ImageFormat::WebP => "WEBP",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}
