//! DCT-based Perceptual Hash (pHash).
//!
//! 1. Take the normalized 32x32 grayscale image
//! 2. Run a 2-D DCT-II (rows, then columns)
//! 3. Keep the low-frequency 8x8 block
//! 4. Threshold each coefficient against the median of the 63 AC terms
//!
//! Most robust of the image hashes: tolerates recompression, small edits
//! and colour adjustments.

use crate::core::hasher::traits::{
    format_hash64, hamming_similarity, Computed, HashInput, HashMethod, HashSubject,
};
use crate::core::hasher::PerceptualImage;
use crate::error::HashError;
use rustdct::{DctPlanner, TransformType2And3};
use std::sync::Arc;

const SIZE: usize = PerceptualImage::SIZE as usize;
const LOW: usize = 8;

pub struct PerceptualHash {
    dct: Arc<dyn TransformType2And3<f64>>,
}

impl PerceptualHash {
    pub const KEY: &'static str = "Perceptual Hash";

    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        Self {
            dct: planner.plan_dct2(SIZE),
        }
    }

    pub fn hash(&self, image: &PerceptualImage) -> u64 {
        let coefficients = self.dct_2d(image.samples());
        let coefficients = &coefficients;

        let low: Vec<f64> = (0..LOW)
            .flat_map(|v| (0..LOW).map(move |u| coefficients[v * SIZE + u]))
            .collect();

        let mut ac: Vec<f64> = low[1..].to_vec();
        ac.sort_by(f64::total_cmp);
        let median = ac[ac.len() / 2];

        low.iter()
            .enumerate()
            .filter(|(_, &value)| value > median)
            .fold(0u64, |hash, (index, _)| hash | (1 << (63 - index)))
    }

    /// Separable 2-D DCT-II of a row-major `SIZE` x `SIZE` block, with the
    /// usual 1/sqrt(2) weighting of the zero-frequency row and column.
    fn dct_2d(&self, mut samples: Vec<f64>) -> Vec<f64> {
        for row in samples.chunks_exact_mut(SIZE) {
            self.dct.process_dct2(row);
        }

        let mut column = vec![0.0; SIZE];
        for x in 0..SIZE {
            for y in 0..SIZE {
                column[y] = samples[y * SIZE + x];
            }
            self.dct.process_dct2(&mut column);
            for y in 0..SIZE {
                samples[y * SIZE + x] = column[y];
            }
        }

        let weight = std::f64::consts::FRAC_1_SQRT_2;
        for i in 0..SIZE {
            samples[i] *= weight;
            samples[i * SIZE] *= weight;
        }
        samples
    }
}

impl Default for PerceptualHash {
    fn default() -> Self {
        Self::new()
    }
}

impl HashMethod for PerceptualHash {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn input_kind(&self) -> HashInput {
        HashInput::Image
    }

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError> {
        match subject {
            HashSubject::Image(image) => Ok(Computed::Supported(format_hash64(self.hash(image)))),
            HashSubject::Bytes(_) => Ok(Computed::Unsupported),
        }
    }

    fn compare(&self, a: &str, b: &str) -> f64 {
        hamming_similarity(a, b)
    }
}
