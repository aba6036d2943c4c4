//! EXIF orientation correction.

use image::DynamicImage;

/// Rotate/flip a decoded image so it displays upright.
///
/// Codes follow the EXIF Orientation tag; 1 and unknown codes leave the
/// image untouched.
pub fn apply_orientation(image: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}
