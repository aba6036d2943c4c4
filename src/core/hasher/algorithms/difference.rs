//! Difference Hash (dHash).
//!
//! 1. Resize the normalized image to 9x8
//! 2. Compare each sample to the one on its right
//! 3. If the left sample is brighter, set the bit
//!
//! Captures the horizontal brightness gradient, which survives resizing
//! and mild recompression.

use crate::core::hasher::fast_resize::FastResizer;
use crate::core::hasher::traits::{
    format_hash64, hamming_similarity, Computed, HashInput, HashMethod, HashSubject,
};
use crate::core::hasher::PerceptualImage;
use crate::error::HashError;
use image::DynamicImage;

const WIDTH: u32 = 9;
const HEIGHT: u32 = 8;

#[derive(Default)]
pub struct DifferenceHash {
    resizer: FastResizer,
}

impl DifferenceHash {
    pub const KEY: &'static str = "Difference Hash";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(&mut self, image: &PerceptualImage) -> Result<u64, HashError> {
        let source = DynamicImage::ImageLuma8(image.as_gray().clone());
        let gray = self.resizer.resize_to_grayscale(&source, WIDTH, HEIGHT)?;

        let mut hash = 0u64;
        for y in 0..HEIGHT {
            for x in 0..WIDTH - 1 {
                let left = gray.get_pixel(x, y)[0];
                let right = gray.get_pixel(x + 1, y)[0];
                if left > right {
                    hash |= 1 << (y * 8 + x);
                }
            }
        }
        Ok(hash)
    }
}

impl HashMethod for DifferenceHash {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn input_kind(&self) -> HashInput {
        HashInput::Image
    }

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError> {
        match subject {
            HashSubject::Image(image) => Ok(Computed::Supported(format_hash64(self.hash(image)?))),
            HashSubject::Bytes(_) => Ok(Computed::Unsupported),
        }
    }

    fn compare(&self, a: &str, b: &str) -> f64 {
        hamming_similarity(a, b)
    }
}
