//! # Similarity Module
//!
//! Groups hashed photos into sets of visually equivalent images.
//!
//! ## How It Works
//! 1. Partition results by content hash (exact duplicates)
//! 2. Pick a representative per exact group: most pixels, then largest file
//! 3. Walk exact groups best-first; merge each into the first cluster whose
//!    representative scores at or above the strong threshold, or open a
//!    new cluster
//! 4. Report clusters with two or more members
//!
//! ## Confidence
//! A weighted mean of per-method similarities, over the methods both sides
//! have a value for:
//!
//! | Method | Weight |
//! |--------|--------|
//! | Perceptual Hash | 0.45 |
//! | Difference Hash | 0.25 |
//! | Average Hash | 0.20 |
//! | Aspect Ratio | 0.10 |

mod engine;

pub use engine::SimilarityEngine;

use crate::core::hasher::{
    AspectRatioHash, AverageHash, DifferenceHash, HashedImageResult, PerceptualHash, Resolution,
};
use crate::core::scanner::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Default minimum confidence for two clusters to merge
pub const DEFAULT_STRONG_THRESHOLD: f64 = 0.90;

/// Grouping parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityConfig {
    pub strong_threshold: f64,
    /// Method key to weight; methods not listed do not contribute
    pub weights: Vec<(String, f64)>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            strong_threshold: DEFAULT_STRONG_THRESHOLD,
            weights: vec![
                (PerceptualHash::KEY.to_string(), 0.45),
                (DifferenceHash::KEY.to_string(), 0.25),
                (AverageHash::KEY.to_string(), 0.20),
                (AspectRatioHash::KEY.to_string(), 0.10),
            ],
        }
    }
}

impl SimilarityConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.strong_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set or replace the weight of one method
    pub fn with_weight(mut self, key: impl Into<String>, weight: f64) -> Self {
        let key = key.into();
        match self.weights.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = weight,
            None => self.weights.push((key, weight)),
        }
        self
    }

    pub fn weight(&self, key: &str) -> Option<f64> {
        self.weights.iter().find(|(k, _)| k == key).map(|(_, w)| *w)
    }
}

/// One photo inside an [`ImageGroup`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub path: PathBuf,
    pub file_size: u64,
    /// Unix seconds
    pub modified: i64,
    pub resolution: Resolution,
    pub format: ImageFormat,
    pub orientation: Option<u16>,
    pub is_best: bool,
}

impl ImageEntry {
    pub fn from_result(result: &HashedImageResult, is_best: bool) -> Self {
        let identity = result.identity();
        Self {
            path: identity.path(),
            file_size: identity.size(),
            modified: identity.modified(),
            resolution: result.resolution(),
            format: identity.format(),
            orientation: identity.exif().orientation,
            is_best,
        }
    }
}

/// A set of visually equivalent photos with one recommended keeper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGroup {
    pub id: Uuid,
    pub images: Vec<ImageEntry>,
    pub best_index: usize,
}

impl ImageGroup {
    /// Build a group, flagging `images[best_index]` as the only best entry.
    ///
    /// An out-of-range index falls back to the first image.
    pub fn new(mut images: Vec<ImageEntry>, best_index: usize) -> Self {
        let best_index = if best_index < images.len() { best_index } else { 0 };
        for (index, image) in images.iter_mut().enumerate() {
            image.is_best = index == best_index;
        }
        Self {
            id: Uuid::new_v4(),
            images,
            best_index,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn best(&self) -> Option<&ImageEntry> {
        self.images.get(self.best_index)
    }

    /// Images other than the best one
    pub fn duplicates(&self) -> impl Iterator<Item = &ImageEntry> {
        self.images.iter().filter(|image| !image.is_best)
    }

    pub fn duplicate_count(&self) -> usize {
        self.images.len().saturating_sub(1)
    }

    /// Bytes freed by removing every duplicate
    pub fn reclaimable_bytes(&self) -> u64 {
        self.duplicates().map(|image| image.file_size).sum()
    }
}
