//! Hash method implementations.

mod aspect;
mod average;
mod content;
mod difference;
mod perceptual;

pub use aspect::AspectRatioHash;
pub use average::AverageHash;
pub use content::Sha256Hash;
pub use difference::DifferenceHash;
pub use perceptual::PerceptualHash;
