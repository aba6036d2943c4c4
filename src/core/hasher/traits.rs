//! Hash method trait definitions.

use super::PerceptualImage;
use crate::error::HashError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a hash method consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashInput {
    /// Raw file content
    Bytes,
    /// The decoded, orientation-corrected, normalized image
    Image,
}

/// Input handed to [`HashMethod::compute`]
#[derive(Debug, Clone, Copy)]
pub enum HashSubject<'a> {
    Bytes(&'a [u8]),
    Image(&'a PerceptualImage),
}

impl HashSubject<'_> {
    pub fn kind(&self) -> HashInput {
        match self {
            HashSubject::Bytes(_) => HashInput::Bytes,
            HashSubject::Image(_) => HashInput::Image,
        }
    }
}

/// Outcome of a compute call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computed {
    Supported(String),
    /// The method does not accept this kind of input
    Unsupported,
}

/// Hash method key to version, as stored alongside cached values
pub type MethodVersions = BTreeMap<String, u32>;

/// A hash algorithm with its comparator.
///
/// Instances are created per worker by the
/// [`HashCatalog`](super::HashCatalog), so implementations may keep
/// scratch state behind `&mut self`. `compare` is shared across threads
/// by the similarity engine.
pub trait HashMethod: Send + Sync {
    /// Stable key used in results, the cache and similarity weights
    fn key(&self) -> &'static str;

    /// Bumped whenever the encoding changes, invalidating cached values
    fn version(&self) -> u32 {
        1
    }

    fn input_kind(&self) -> HashInput;

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError>;

    /// Similarity of two encoded values in `[0.0, 1.0]`.
    ///
    /// Must be symmetric and return 1.0 for identical well-formed values.
    /// Values that cannot be parsed compare as 0.0.
    fn compare(&self, a: &str, b: &str) -> f64;
}

/// Parse a 16-digit hex value as produced by the 64-bit image hashes
pub fn parse_hash64(value: &str) -> Option<u64> {
    if value.len() != 16 {
        return None;
    }
    u64::from_str_radix(value, 16).ok()
}

/// Encode a 64-bit hash as 16 upper-case hex digits
pub fn format_hash64(value: u64) -> String {
    format!("{:016X}", value)
}

/// Hamming similarity of two encoded 64-bit hashes
pub fn hamming_similarity(a: &str, b: &str) -> f64 {
    match (parse_hash64(a), parse_hash64(b)) {
        (Some(a), Some(b)) => {
            let distance = (a ^ b).count_ones() as f64;
            (1.0 - distance / 64.0).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}
