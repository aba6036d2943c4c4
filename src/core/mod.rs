//! # Core Module
//!
//! The presentation-agnostic duplicate detection engine.
//!
//! ## Modules
//! - `queue` - Bounded MPMC queue with producer-counted shutdown
//! - `stage` - Thread lifecycle shared by every pipeline stage
//! - `scanner` - Discovers photos in directories
//! - `metadata` - Extracts EXIF metadata from photos
//! - `cache` - Persists hashes to avoid recomputation
//! - `reader` - Reads file contents for cache misses
//! - `hasher` - Computes content and perceptual hashes
//! - `similarity` - Groups hashed photos into duplicate sets
//! - `pipeline` - Wires the stages together and runs a scan

pub mod cache;
pub mod hasher;
pub mod metadata;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod scanner;
pub mod similarity;
pub mod stage;

pub use hasher::{HashCatalog, HashedImageResult};
pub use scanner::{FileIdentity, ScanRequest};
pub use similarity::{ImageEntry, ImageGroup};
