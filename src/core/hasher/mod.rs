//! # Hasher Module
//!
//! Computes every enabled hash for one file.
//!
//! ## Methods
//! - **SHA256** - content digest; equal digests mean identical bytes
//! - **Perceptual Hash** - DCT low-frequency signature, the strongest visual signal
//! - **Difference Hash** - horizontal gradient signature
//! - **Average Hash** - brightness-above-mean signature
//! - **Aspect Ratio** - width/height of the decoded image
//!
//! ## How It Works
//! 1. Byte methods run on the raw content
//! 2. The content is decoded once and corrected for EXIF orientation
//! 3. The decoded image is normalized into a [`PerceptualImage`]
//! 4. Every image method runs on that one normalized image
//!
//! A failing method only poisons its own slot; decode failures poison the
//! image slots. Either way the result is forwarded with source `Error`.
//!
//! ## Performance
//! - `zune-jpeg` for JPEG decoding
//! - `fast_image_resize` for SIMD resizing

mod algorithms;
mod catalog;
mod engine;
pub mod fast_decode;
pub mod fast_resize;
pub mod orientation;
mod perceptual_image;
mod traits;

pub use algorithms::{AspectRatioHash, AverageHash, DifferenceHash, PerceptualHash, Sha256Hash};
pub use catalog::HashCatalog;
pub use engine::HashEngine;
pub use fast_resize::FastResizer;
pub use perceptual_image::PerceptualImage;
pub use traits::{
    format_hash64, hamming_similarity, parse_hash64, Computed, HashInput, HashMethod,
    HashSubject, MethodVersions,
};

use crate::core::scanner::FileIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a result's hashes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashSource {
    /// Computed in this run
    Fresh,
    /// Served from the hash cache
    Cache,
    /// At least one method failed
    Error,
}

/// Content of one hash slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashValue {
    Value(String),
    /// The method failed; holds the error text
    Failed(String),
}

impl HashValue {
    pub fn value(&self) -> Option<&str> {
        match self {
            HashValue::Value(value) => Some(value),
            HashValue::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, HashValue::Failed(_))
    }
}

/// Decoded image dimensions; zero when the image could not be decoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Resolution::new(width, height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// All hashes computed (or loaded) for one file.
///
/// Slots can be added but never removed or replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashedImageResult {
    identity: FileIdentity,
    source: HashSource,
    computed_at: DateTime<Utc>,
    resolution: Resolution,
    hashes: BTreeMap<String, HashValue>,
}

impl HashedImageResult {
    pub fn new(identity: FileIdentity, source: HashSource) -> Self {
        Self {
            identity,
            source,
            computed_at: Utc::now(),
            resolution: Resolution::default(),
            hashes: BTreeMap::new(),
        }
    }

    pub fn with_computed_at(mut self, computed_at: DateTime<Utc>) -> Self {
        self.computed_at = computed_at;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn identity(&self) -> &FileIdentity {
        &self.identity
    }

    pub fn source(&self) -> HashSource {
        self.source
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
    }

    /// Store a value. Returns false, leaving the slot alone, if `key` is
    /// already present.
    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        self.insert(key.into(), HashValue::Value(value.into()))
    }

    /// Record a failed method and mark the whole result as `Error`.
    pub fn record_failure(&mut self, key: impl Into<String>, message: impl Into<String>) -> bool {
        self.source = HashSource::Error;
        self.insert(key.into(), HashValue::Failed(message.into()))
    }

    fn insert(&mut self, key: String, value: HashValue) -> bool {
        match self.hashes.entry(key) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// The successful value for `key`, if any
    pub fn hash(&self, key: &str) -> Option<&str> {
        self.hashes.get(key).and_then(HashValue::value)
    }

    pub fn slot(&self, key: &str) -> Option<&HashValue> {
        self.hashes.get(key)
    }

    pub fn hashes(&self) -> &BTreeMap<String, HashValue> {
        &self.hashes
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.hashes.iter().filter_map(|(key, value)| match value {
            HashValue::Failed(message) => Some((key.as_str(), message.as_str())),
            HashValue::Value(_) => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.hashes.values().any(HashValue::is_failed)
    }
}
