//! Image decoding from in-memory bytes.
//!
//! Uses zune-jpeg for JPEG content (1.5-2x faster than the image crate)
//! and falls back to the image crate for everything else.

use crate::error::HashError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Stateless decoder that picks the fastest path per format
pub struct FastDecoder;

impl FastDecoder {
    /// Decode raw file content. `path` is only used in error messages.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<DynamicImage, HashError> {
        if bytes.is_empty() {
            return Err(HashError::EmptyImage {
                path: path.to_path_buf(),
            });
        }

        let image = if bytes.starts_with(&JPEG_MAGIC) {
            Self::decode_jpeg(bytes, path).or_else(|_| Self::decode_fallback(bytes, path))?
        } else {
            Self::decode_fallback(bytes, path)?
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(HashError::EmptyImage {
                path: path.to_path_buf(),
            });
        }
        Ok(image)
    }

    fn decode_jpeg(bytes: &[u8], path: &Path) -> Result<DynamicImage, HashError> {
        let decode_error = |reason: String| HashError::DecodeError {
            path: path.to_path_buf(),
            reason,
        };

        let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
        let mut decoder = JpegDecoder::new_with_options(bytes, options);

        let pixels = decoder
            .decode()
            .map_err(|e| decode_error(format!("zune-jpeg decode failed: {:?}", e)))?;

        let info = decoder
            .info()
            .ok_or_else(|| decode_error("missing JPEG header info".to_string()))?;
        let (width, height) = (info.width as u32, info.height as u32);

        let image = match decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB) {
            ColorSpace::RGB => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageRgba8),
            ColorSpace::Luma => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
                .map(DynamicImage::ImageLuma8),
            other => {
                return Err(decode_error(format!("unsupported colorspace {:?}", other)));
            }
        };

        image.ok_or_else(|| decode_error("pixel buffer does not match dimensions".to_string()))
    }

    fn decode_fallback(bytes: &[u8], path: &Path) -> Result<DynamicImage, HashError> {
        image::load_from_memory(bytes).map_err(|e| HashError::DecodeError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
