//! # Metadata Module
//!
//! Reads the EXIF subset that is part of a file's identity.
//!
//! ## Extracted Fields
//! - Orientation (1-8 only)
//! - Original capture time (DateTimeOriginal, seconds since the epoch)
//! - Camera make and model
//!
//! Reading never fails: a missing file, unsupported container or corrupt
//! EXIF block yields an empty [`ExifData`].

use chrono::NaiveDateTime;
use exif::{In, Reader, Tag, Value};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// EXIF fields tracked per file.
///
/// `PartialEq` is structural. Cache validation uses
/// [`ExifData::is_compatible_with`], which treats absent fields as wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExifData {
    /// Image orientation (1-8, where 1 is normal)
    pub orientation: Option<u16>,
    /// Original capture time as Unix seconds
    pub captured_at: Option<i64>,
    /// Camera make (e.g., "Apple", "Canon")
    pub camera_make: Option<String>,
    /// Camera model (e.g., "iPhone 15 Pro")
    pub camera_model: Option<String>,
}

impl ExifData {
    pub fn is_empty(&self) -> bool {
        self.orientation.is_none()
            && self.captured_at.is_none()
            && self.camera_make.is_none()
            && self.camera_model.is_none()
    }

    /// True when no field populated on both sides differs.
    pub fn is_compatible_with(&self, other: &ExifData) -> bool {
        fn matches<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        matches(&self.orientation, &other.orientation)
            && matches(&self.captured_at, &other.captured_at)
            && matches(&self.camera_make, &other.camera_make)
            && matches(&self.camera_model, &other.camera_model)
    }
}

/// Read the tracked EXIF fields from a photo file.
pub fn read_exif(path: &Path) -> ExifData {
    let mut exif_data = ExifData::default();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return exif_data,
    };

    let mut bufreader = BufReader::new(&file);
    let exif_reader = match Reader::new().read_from_container(&mut bufreader) {
        Ok(r) => r,
        Err(_) => return exif_data,
    };

    if let Some(field) = exif_reader.get_field(Tag::Orientation, In::PRIMARY) {
        exif_data.orientation = field
            .value
            .get_uint(0)
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| (1..=8).contains(v));
    }

    if let Some(field) = exif_reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
        exif_data.captured_at = get_string_value(&field.value)
            .as_deref()
            .and_then(parse_exif_datetime);
    }

    if let Some(field) = exif_reader.get_field(Tag::Make, In::PRIMARY) {
        exif_data.camera_make = get_string_value(&field.value);
    }

    if let Some(field) = exif_reader.get_field(Tag::Model, In::PRIMARY) {
        exif_data.camera_model = get_string_value(&field.value);
    }

    exif_data
}

/// EXIF date format: "YYYY:MM:DD HH:MM:SS", interpreted as UTC
fn parse_exif_datetime(s: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

fn get_string_value(value: &Value) -> Option<String> {
    if let Value::Ascii(ref vec) = value {
        if let Some(bytes) = vec.first() {
            if let Ok(s) = std::str::from_utf8(bytes) {
                let trimmed = s.trim_end_matches('\0').trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}
