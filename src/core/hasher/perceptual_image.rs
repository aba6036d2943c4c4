//! Normalized image shared by every image-oriented hash method.

use super::fast_resize::FastResizer;
use crate::error::HashError;
use image::{DynamicImage, GrayImage, Luma};

/// Decoded image reduced to a black-padded 32x32 grayscale square.
///
/// The source is scaled to fit while keeping its aspect ratio and centred,
/// so images that differ only in resolution normalize to the same pixels.
#[derive(Debug, Clone)]
pub struct PerceptualImage {
    square: GrayImage,
    source_width: u32,
    source_height: u32,
}

impl PerceptualImage {
    /// Side length of the normalized square
    pub const SIZE: u32 = 32;

    pub fn new(image: &DynamicImage, resizer: &mut FastResizer) -> Result<Self, HashError> {
        let (source_width, source_height) = (image.width(), image.height());
        let scaled = resizer.fit_to_grayscale(image, Self::SIZE)?;

        let mut square = GrayImage::from_pixel(Self::SIZE, Self::SIZE, Luma([0]));
        let offset_x = (Self::SIZE - scaled.width()) / 2;
        let offset_y = (Self::SIZE - scaled.height()) / 2;
        image::imageops::replace(&mut square, &scaled, offset_x as i64, offset_y as i64);

        Ok(Self {
            square,
            source_width,
            source_height,
        })
    }

    /// Sample at (x, y); coordinates outside the square are clamped to the edge.
    pub fn pixel(&self, x: i64, y: i64) -> f64 {
        let max = Self::SIZE as i64 - 1;
        let x = x.clamp(0, max) as u32;
        let y = y.clamp(0, max) as u32;
        self.square.get_pixel(x, y)[0] as f64
    }

    /// Mean of the `block` x `block` cell whose top-left corner is (x, y).
    pub fn block_mean(&self, x: i64, y: i64, block: i64) -> f64 {
        let mut sum = 0.0;
        for dy in 0..block {
            for dx in 0..block {
                sum += self.pixel(x + dx, y + dy);
            }
        }
        sum / (block * block) as f64
    }

    /// Row-major copy of all samples
    pub fn samples(&self) -> Vec<f64> {
        self.square.pixels().map(|p| p[0] as f64).collect()
    }

    /// Dimensions of the decoded image before normalization
    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.square
    }
}
