//! End-to-end pipeline tests.
//!
//! These run the full stage graph against real files on disk:
//! - Exact and re-encoded duplicates end up in one group, best first
//! - A rescan is served from the cache
//! - Unreadable and undecodable files never abort a scan

use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use photoboss::core::cache::{HashCache, InMemoryHashCache, SqliteCacheFactory, SqliteHashCache};
use photoboss::core::hasher::HashCatalog;
use photoboss::core::pipeline::PipelineController;
use photoboss::core::scanner::ScanRequest;
use photoboss::error::PipelineError;
use photoboss::events::{Event, EventChannel, PipelineEvent};
use predicates::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn scene(seed: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(96, 64, |x, y| {
        let band = ((x / 12 + y / 16 + seed) % 4) as u8;
        Rgb([band * 60, (x * 2) as u8, (255 - y * 3) as u8])
    }))
}

fn save(image: &DynamicImage, path: &Path, format: ImageFormat) {
    image.save_with_format(path, format).unwrap();
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Smooth gradients with one bright disc; survives downscaling and JPEG.
fn landscape(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        let fx = x as f32 / width as f32;
        let fy = y as f32 / height as f32;
        let in_sun = (fx - 0.7).powi(2) + (fy - 0.3).powi(2) < 0.02;
        Rgb([
            (fx * 255.0) as u8,
            ((1.0 - fy) * 255.0) as u8,
            if in_sun { 255 } else { 40 },
        ])
    }))
}

#[test]
fn lower_resolution_reencode_joins_exact_copies() {
    let temp = TempDir::new().unwrap();
    let original = landscape(400, 300);
    save(&original, temp.child("a.png").path(), ImageFormat::Png);
    std::fs::copy(temp.child("a.png").path(), temp.child("copy.png").path()).unwrap();
    let smaller = original.resize_exact(200, 150, FilterType::Triangle);
    save(&smaller, temp.child("small.jpg").path(), ImageFormat::Jpeg);

    let mut pipeline = PipelineController::builder().workers(2).build();
    let report = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();

    assert_eq!(report.total_files, 3);
    assert_eq!(report.groups.len(), 1);

    let group = &report.groups[0];
    assert_eq!(group.len(), 3);
    let best = group.best().unwrap();
    assert_eq!(file_name(&best.path), "a.png");
    assert_eq!(best.resolution.width, 400);
    assert_eq!(best.resolution.height, 300);
    assert_eq!(group.images.iter().filter(|i| i.is_best).count(), 1);
}

#[test]
fn copies_and_reencodes_are_grouped_together() {
    let temp = TempDir::new().unwrap();
    let original = scene(1);
    save(&original, temp.child("original.png").path(), ImageFormat::Png);
    save(&original, temp.child("copy.png").path(), ImageFormat::Png);
    save(&original, temp.child("export.bmp").path(), ImageFormat::Bmp);
    save(
        &DynamicImage::ImageRgb8(ImageBuffer::from_fn(96, 64, |x, y| {
            Rgb([((x * y) % 256) as u8, 255 - (x as u8), (y * 4) as u8])
        })),
        temp.child("other.png").path(),
        ImageFormat::Png,
    );

    let mut pipeline = PipelineController::builder().workers(2).build();
    let report = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();

    assert_eq!(report.total_files, 4);
    assert_eq!(report.groups.len(), 1);

    let group = &report.groups[0];
    let mut names: Vec<String> = group.images.iter().map(|i| file_name(&i.path)).collect();
    names.sort();
    assert_eq!(names, vec!["copy.png", "export.bmp", "original.png"]);
    assert_eq!(group.images.iter().filter(|i| i.is_best).count(), 1);
    assert!(group.images[group.best_index].is_best);
}

#[test]
fn exact_only_catalog_ignores_reencodes() {
    let temp = TempDir::new().unwrap();
    let original = scene(2);
    save(&original, temp.child("a.png").path(), ImageFormat::Png);
    std::fs::copy(temp.child("a.png").path(), temp.child("b.png").path()).unwrap();
    save(&original, temp.child("c.bmp").path(), ImageFormat::Bmp);

    let mut pipeline = PipelineController::builder()
        .catalog(HashCatalog::new().with_enabled(["SHA256"]).unwrap())
        .build();
    let report = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].len(), 2);
    assert!(report.groups[0]
        .images
        .iter()
        .all(|i| i.path.extension().unwrap() == "png"));
}

#[test]
fn rescan_is_served_from_sqlite_cache() {
    let temp = TempDir::new().unwrap();
    save(&scene(3), temp.child("photos/a.png").path_parent(), ImageFormat::Png);
    save(&scene(9), temp.child("photos/b.png").path_parent(), ImageFormat::Png);
    let db = temp.child("cache/hashes.sqlite");

    let mut pipeline = PipelineController::builder()
        .cache(Arc::new(SqliteCacheFactory::new(db.path())))
        .build();
    let request = ScanRequest::new(temp.child("photos").path(), true);

    let first = pipeline.run_scan(request.clone()).unwrap();
    assert_eq!(first.hashed, 2);
    assert_eq!(first.cache_hits, 0);
    db.assert(predicate::path::is_file());

    let second = pipeline.run_scan(request).unwrap();
    assert_eq!(second.total_files, 2);
    assert_eq!(second.cache_hits, 2);
    assert_eq!(second.hashed, 0);

    drop(pipeline);
    let stats = SqliteHashCache::open(db.path()).unwrap().stats().unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.last_scan_id, 2);
}

#[test]
fn modified_file_is_rehashed() {
    let temp = TempDir::new().unwrap();
    let target = temp.child("a.png");
    save(&scene(4), target.path(), ImageFormat::Png);

    let cache = InMemoryHashCache::new();
    let mut pipeline = PipelineController::builder()
        .cache(Arc::new(cache.clone()))
        .build();
    let request = ScanRequest::new(temp.path(), false);
    pipeline.run_scan(request.clone()).unwrap();

    // A different size is enough to invalidate the cached identity.
    let bigger = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(120, 80, Rgb([1, 2, 3])));
    save(&bigger, target.path(), ImageFormat::Png);

    let report = pipeline.run_scan(request).unwrap();
    assert_eq!(report.cache_hits, 0);
    assert_eq!(report.hashed, 1);
    assert_eq!(cache.stats().unwrap().files, 1);
}

#[test]
fn broken_files_do_not_abort_the_scan() {
    let temp = TempDir::new().unwrap();
    temp.child("corrupt.jpg")
        .write_binary(b"this is not a valid image file")
        .unwrap();
    temp.child("notes.txt").write_str("not an image").unwrap();
    save(&scene(5), temp.child("fine.png").path(), ImageFormat::Png);

    let mut pipeline = PipelineController::builder().build();
    let report = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();

    assert_eq!(report.total_files, 2);
    assert_eq!(report.errors, 1);
    assert!(report.groups.is_empty());
}

#[test]
fn recursive_flag_controls_depth() {
    let temp = TempDir::new().unwrap();
    save(&scene(6), temp.child("top.png").path(), ImageFormat::Png);
    save(&scene(6), temp.child("nested/deeper/low.png").path_parent(), ImageFormat::Png);
    temp.child("nested/deeper/low.png")
        .assert(predicate::path::exists());

    let mut pipeline = PipelineController::builder().build();
    let shallow = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();
    assert_eq!(shallow.total_files, 1);

    let deep = pipeline
        .run_scan(ScanRequest::new(temp.path(), true))
        .unwrap();
    assert_eq!(deep.total_files, 2);
    assert_eq!(deep.groups.len(), 1);
}

#[test]
fn completion_event_carries_the_summary() {
    let temp = TempDir::new().unwrap();
    save(&scene(7), temp.child("a.png").path(), ImageFormat::Png);
    std::fs::copy(temp.child("a.png").path(), temp.child("b.png").path()).unwrap();

    let (sender, receiver) = EventChannel::new();
    let mut pipeline = PipelineController::builder().events(sender).build();
    let report = pipeline
        .run_scan(ScanRequest::new(temp.path(), false))
        .unwrap();
    drop(pipeline);

    let summary = receiver
        .iter()
        .find_map(|event| match event {
            Event::Pipeline(PipelineEvent::Completed { summary }) => Some(summary),
            _ => None,
        })
        .unwrap();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.reclaimable_bytes, report.reclaimable_bytes());
}

#[test]
fn no_methods_is_rejected_before_scanning() {
    let mut pipeline = PipelineController::builder().build();
    let result = pipeline.update_active_methods(Vec::<&str>::new());
    assert!(matches!(result, Err(PipelineError::NoActiveMethods)));
    assert!(!pipeline.is_running());
}

/// Create parent directories for a fixture path and hand the path back.
trait PathParent {
    fn path_parent(&self) -> &Path;
}

impl PathParent for assert_fs::fixture::ChildPath {
    fn path_parent(&self) -> &Path {
        if let Some(parent) = self.path().parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        self.path()
    }
}
