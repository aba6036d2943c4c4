//! Per-worker hash computation.

use super::fast_decode::FastDecoder;
use super::fast_resize::FastResizer;
use super::orientation::apply_orientation;
use super::traits::{Computed, HashInput, HashMethod, HashSubject};
use super::{HashCatalog, HashSource, HashedImageResult, PerceptualImage, Resolution};
use crate::core::scanner::FileIdentity;
use crate::error::{HashError, PipelineError};
use tracing::debug;

/// One worker's set of method instances plus its scratch buffers.
pub struct HashEngine {
    methods: Vec<Box<dyn HashMethod>>,
    resizer: FastResizer,
}

impl HashEngine {
    pub fn new(catalog: &HashCatalog) -> Result<Self, PipelineError> {
        Ok(Self::with_methods(catalog.instantiate()?))
    }

    pub fn with_methods(methods: Vec<Box<dyn HashMethod>>) -> Self {
        Self {
            methods,
            resizer: FastResizer::new(),
        }
    }

    pub fn method_keys(&self) -> Vec<&'static str> {
        self.methods.iter().map(|m| m.key()).collect()
    }

    fn needs_image(&self) -> bool {
        self.methods
            .iter()
            .any(|m| m.input_kind() == HashInput::Image)
    }

    /// Hash one file's content.
    ///
    /// Never fails: every problem ends up in the affected slot and the
    /// result's source becomes [`HashSource::Error`].
    pub fn compute(&mut self, identity: FileIdentity, bytes: &[u8]) -> HashedImageResult {
        let mut result = HashedImageResult::new(identity, HashSource::Fresh);

        for method in self
            .methods
            .iter_mut()
            .filter(|m| m.input_kind() == HashInput::Bytes)
        {
            record(&mut result, method.key(), method.compute(HashSubject::Bytes(bytes)));
        }

        if !self.needs_image() {
            return result;
        }

        match self.prepare_image(&result, bytes) {
            Ok(image) => {
                result.set_resolution(Resolution::from(image.source_dimensions()));
                for method in self
                    .methods
                    .iter_mut()
                    .filter(|m| m.input_kind() == HashInput::Image)
                {
                    record(&mut result, method.key(), method.compute(HashSubject::Image(&image)));
                }
            }
            Err(error) => {
                debug!(path = %result.identity().path().display(), %error, "decode failed");
                let message = error.to_string();
                for method in self
                    .methods
                    .iter()
                    .filter(|m| m.input_kind() == HashInput::Image)
                {
                    result.record_failure(method.key(), message.clone());
                }
            }
        }

        result
    }

    fn prepare_image(
        &mut self,
        result: &HashedImageResult,
        bytes: &[u8],
    ) -> Result<PerceptualImage, HashError> {
        let identity = result.identity();
        let decoded = FastDecoder::decode(bytes, &identity.path())?;
        let oriented = match identity.exif().orientation {
            Some(code) => apply_orientation(decoded, code),
            None => decoded,
        };
        PerceptualImage::new(&oriented, &mut self.resizer)
    }
}

fn record(result: &mut HashedImageResult, key: &str, outcome: Result<Computed, HashError>) {
    match outcome {
        Ok(Computed::Supported(value)) => {
            result.insert_value(key, value);
        }
        Ok(Computed::Unsupported) => {
            result.record_failure(key, "input kind not supported");
        }
        Err(error) => {
            result.record_failure(key, error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::ExifData;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn identity(orientation: Option<u16>) -> FileIdentity {
        FileIdentity::new(
            "a.png",
            "/photos",
            "png",
            0,
            0,
            ExifData {
                orientation,
                ..Default::default()
            },
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 90])
        }));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn computes_every_enabled_method() {
        let mut engine = HashEngine::new(&HashCatalog::new()).unwrap();
        let result = engine.compute(identity(None), &png(64, 48));

        assert_eq!(result.source(), HashSource::Fresh);
        assert_eq!(result.resolution(), Resolution::new(64, 48));
        for key in HashCatalog::new().keys() {
            assert!(result.hash(key).is_some(), "missing {key}");
        }
        assert_eq!(result.hash("Aspect Ratio"), Some("1.333333"));
    }

    #[test]
    fn orientation_is_applied_before_hashing() {
        let mut engine = HashEngine::new(&HashCatalog::new()).unwrap();
        let result = engine.compute(identity(Some(6)), &png(64, 48));
        assert_eq!(result.resolution(), Resolution::new(48, 64));
    }

    #[test]
    fn decode_failure_keeps_byte_hashes() {
        let mut engine = HashEngine::new(&HashCatalog::new()).unwrap();
        let result = engine.compute(identity(None), b"not an image at all");

        assert_eq!(result.source(), HashSource::Error);
        assert_eq!(result.resolution(), Resolution::default());
        assert!(result.hash("SHA256").is_some());
        assert!(result.slot("Perceptual Hash").unwrap().is_failed());
        assert!(result.slot("Average Hash").unwrap().is_failed());
    }

    #[test]
    fn byte_only_engine_skips_decoding() {
        let catalog = HashCatalog::new().with_enabled(["SHA256"]).unwrap();
        let mut engine = HashEngine::new(&catalog).unwrap();
        let result = engine.compute(identity(None), b"not an image at all");

        assert_eq!(result.source(), HashSource::Fresh);
        assert_eq!(result.hashes().len(), 1);
    }
}
