//! Aspect-ratio signal.
//!
//! Not a hash in the strict sense: it records `width / height` of the
//! decoded image so the similarity engine can down-weight pairs whose
//! shapes disagree.

use crate::core::hasher::traits::{Computed, HashInput, HashMethod, HashSubject};
use crate::error::HashError;

#[derive(Debug, Default)]
pub struct AspectRatioHash;

impl AspectRatioHash {
    pub const KEY: &'static str = "Aspect Ratio";

    pub fn new() -> Self {
        Self
    }

    fn parse(value: &str) -> Option<f64> {
        value
            .parse::<f64>()
            .ok()
            .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
    }
}

impl HashMethod for AspectRatioHash {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn input_kind(&self) -> HashInput {
        HashInput::Image
    }

    fn compute(&mut self, subject: HashSubject<'_>) -> Result<Computed, HashError> {
        let HashSubject::Image(image) = subject else {
            return Ok(Computed::Unsupported);
        };

        let (width, height) = image.source_dimensions();
        if width == 0 || height == 0 {
            return Err(HashError::ComputationFailed(format!(
                "cannot take the aspect ratio of a {}x{} image",
                width, height
            )));
        }
        Ok(Computed::Supported(format!(
            "{:.6}",
            width as f64 / height as f64
        )))
    }

    fn compare(&self, a: &str, b: &str) -> f64 {
        match (Self::parse(a), Self::parse(b)) {
            (Some(a), Some(b)) => a.min(b) / a.max(b),
            _ => 0.0,
        }
    }
}
