//! Fast SIMD-accelerated grayscale resizing.
//!
//! Uses fast_image_resize, which picks AVX2/NEON when available.

use crate::error::HashError;
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};

/// Reusable resizer; keep one per worker thread.
pub struct FastResizer {
    resizer: Resizer,
}

impl FastResizer {
    pub fn new() -> Self {
        Self {
            resizer: Resizer::new(),
        }
    }

    /// Convert to grayscale, then resize to exactly `width` x `height`.
    pub fn resize_to_grayscale(
        &mut self,
        image: &DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<GrayImage, HashError> {
        let gray = image.to_luma8();

        let src_width = gray.width();
        let src_height = gray.height();

        if src_width == 0 || src_height == 0 {
            return Err(HashError::ComputationFailed(
                "invalid source dimensions".to_string(),
            ));
        }
        if width == 0 || height == 0 {
            return Err(HashError::ComputationFailed(
                "invalid destination dimensions".to_string(),
            ));
        }
        if src_width == width && src_height == height {
            return Ok(gray);
        }

        let src_image = Image::from_vec_u8(src_width, src_height, gray.into_raw(), PixelType::U8)
            .map_err(|e| {
                HashError::ComputationFailed(format!("failed to wrap source image: {}", e))
            })?;

        let mut dst_image = Image::new(width, height, PixelType::U8);

        let options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

        self.resizer
            .resize(&src_image, &mut dst_image, &options)
            .map_err(|e| HashError::ComputationFailed(format!("resize failed: {}", e)))?;

        let result_buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width, height, dst_image.into_vec()).ok_or_else(|| {
                HashError::ComputationFailed("resized buffer has wrong length".to_string())
            })?;

        Ok(result_buffer)
    }

    /// Scale to fit inside `bound` x `bound` keeping the aspect ratio.
    pub fn fit_to_grayscale(
        &mut self,
        image: &DynamicImage,
        bound: u32,
    ) -> Result<GrayImage, HashError> {
        let (width, height) = fit_within(image.width(), image.height(), bound);
        self.resize_to_grayscale(image, width, height)
    }
}

impl Default for FastResizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest size with the same aspect ratio that fits in `bound` x `bound`.
/// Both sides are at least one pixel.
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (bound, bound);
    }
    if width >= height {
        let scaled = (height as u64 * bound as u64 + width as u64 / 2) / width as u64;
        (bound, (scaled as u32).clamp(1, bound))
    } else {
        let scaled = (width as u64 * bound as u64 + height as u64 / 2) / height as u64;
        ((scaled as u32).clamp(1, bound), bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 64])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn resize_produces_requested_dimensions() {
        let mut resizer = FastResizer::new();
        let resized = resizer
            .resize_to_grayscale(&create_test_image(200, 100), 9, 8)
            .unwrap();

        assert_eq!(resized.dimensions(), (9, 8));
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        assert_eq!(fit_within(200, 100, 32), (32, 16));
        assert_eq!(fit_within(100, 400, 32), (8, 32));
        assert_eq!(fit_within(64, 64, 32), (32, 32));
        assert_eq!(fit_within(10_000, 1, 32), (32, 1));
    }

    #[test]
    fn fit_to_grayscale_respects_bound() {
        let mut resizer = FastResizer::new();
        let resized = resizer
            .fit_to_grayscale(&create_test_image(300, 150), 32)
            .unwrap();
        assert_eq!(resized.dimensions(), (32, 16));
    }

    #[test]
    fn resizer_can_be_reused() {
        let mut resizer = FastResizer::new();
        let image = create_test_image(100, 100);

        let first = resizer.resize_to_grayscale(&image, 8, 8).unwrap();
        let second = resizer.resize_to_grayscale(&image, 8, 8).unwrap();

        assert_eq!(first, second);
    }
}
