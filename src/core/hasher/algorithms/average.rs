//! Average Hash (aHash).
//!
//! 1. Reduce the normalized 32x32 image to an 8x8 grid of 4x4 block means
//! 2. Compute the mean of the grid
//! 3. Set bit i when cell i is at least the mean
//!
//! Cheap and good at spotting resized copies; weak against edits.

use crate::core::hasher::traits::{
    format_hash64, hamming_similarity, Computed, HashInput, HashMethod, HashSubject,
};
use crate::core::hasher::PerceptualImage;
use crate::error::HashError;

const GRID: i64 = 8;
const BLOCK: i64 = PerceptualImage::SIZE as i64 / GRID;

#[derive(Debug, Default)]
pub struct AverageHash;

impl AverageHash {
    pub const KEY: &'static str = "Average Hash";

    pub fn new() -> Self {
        Self
    }

    pub fn hash(image: &PerceptualImage) -> u64 {
        let cells: Vec<f64> = (0..GRID)
            .flat_map(|y| (0..GRID).map(move |x| (x, y)))
            .map(|(x, y)| image.block_mean(x * BLOCK, y * BLOCK, BLOCK))
            .collect();
        let mean = cells.iter().sum::<f64>() / cells.len() as f64;

        cells
            .iter()
            .enumerate()
            .filter(|(_, &cell)| cell >= mean)
            .fold(0u64, |hash, (index, _)| hash | (1 << index))
    }
}

impl HashMethod for AverageHash {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn input_kind(&self) -> HashInput {
        HashInput::Image
    }

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError> {
        match subject {
            HashSubject::Image(image) => Ok(Computed::Supported(format_hash64(Self::hash(image)))),
            HashSubject::Bytes(_) => Ok(Computed::Unsupported),
        }
    }

    fn compare(&self, a: &str, b: &str) -> f64 {
        hamming_similarity(a, b)
    }
}
