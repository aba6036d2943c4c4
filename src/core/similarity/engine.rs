//! Two-phase duplicate grouping: exact content match, then weighted
//! perceptual clustering.

use super::{ImageEntry, ImageGroup, SimilarityConfig};
use crate::core::hasher::{HashCatalog, HashMethod, HashedImageResult, Sha256Hash};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

struct WeightedMethod {
    key: String,
    weight: f64,
    method: Box<dyn HashMethod>,
}

/// Results sharing one content hash, best first
struct ExactGroup<'a> {
    members: Vec<&'a HashedImageResult>,
}

impl<'a> ExactGroup<'a> {
    fn representative(&self) -> &'a HashedImageResult {
        self.members[0]
    }
}

struct Cluster<'a> {
    representative: &'a HashedImageResult,
    members: Vec<&'a HashedImageResult>,
}

/// Groups hashed results into [`ImageGroup`]s.
///
/// Clustering is greedy: an exact group joins the *first* open cluster
/// whose representative scores at or above the threshold, not the best
/// scoring one. Exact groups are visited best representative first, so
/// the outcome does not depend on input order.
pub struct SimilarityEngine {
    config: SimilarityConfig,
    methods: Vec<WeightedMethod>,
}

impl SimilarityEngine {
    /// Build comparators for every weighted method the catalog knows.
    pub fn new(config: SimilarityConfig, catalog: &HashCatalog) -> Self {
        let methods = config
            .weights
            .iter()
            .filter(|(_, weight)| *weight > 0.0)
            .filter_map(|(key, weight)| {
                catalog.comparator(key).map(|method| WeightedMethod {
                    key: key.clone(),
                    weight: *weight,
                    method,
                })
            })
            .collect();

        Self { config, methods }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Weighted similarity of two results in `[0.0, 1.0]`.
    ///
    /// Methods missing or failed on either side are skipped, not counted
    /// as a mismatch. With no method in common the confidence is 0.
    pub fn confidence(&self, a: &HashedImageResult, b: &HashedImageResult) -> f64 {
        let mut score = 0.0;
        let mut used = 0.0;

        for weighted in &self.methods {
            if let (Some(left), Some(right)) = (a.hash(&weighted.key), b.hash(&weighted.key)) {
                score += weighted.method.compare(left, right) * weighted.weight;
                used += weighted.weight;
            }
        }

        if used > 0.0 {
            score / used
        } else {
            0.0
        }
    }

    /// Group `results`, returning only groups with at least two images.
    pub fn group(&self, results: &[HashedImageResult]) -> Vec<ImageGroup> {
        let exact_groups = exact_groups(results);
        let exact_count = exact_groups.len();
        let mut clusters: Vec<Cluster<'_>> = Vec::new();

        for group in exact_groups {
            let candidate = group.representative();
            let found = clusters.par_iter().position_first(|cluster| {
                self.confidence(candidate, cluster.representative) >= self.config.strong_threshold
            });

            match found {
                Some(index) => clusters[index].members.extend(group.members),
                None => clusters.push(Cluster {
                    representative: candidate,
                    members: group.members,
                }),
            }
        }

        let groups: Vec<ImageGroup> = clusters
            .into_iter()
            .filter(|cluster| cluster.members.len() >= 2)
            .map(into_image_group)
            .collect();

        debug!(
            results = results.len(),
            exact_groups = exact_count,
            groups = groups.len(),
            "grouping finished"
        );
        groups
    }
}

/// Better result first: more pixels, then larger file, then path.
fn rank(a: &HashedImageResult, b: &HashedImageResult) -> Ordering {
    b.resolution()
        .pixels()
        .cmp(&a.resolution().pixels())
        .then_with(|| b.identity().size().cmp(&a.identity().size()))
        .then_with(|| a.identity().path().cmp(&b.identity().path()))
}

fn exact_groups(results: &[HashedImageResult]) -> Vec<ExactGroup<'_>> {
    let mut by_content: HashMap<&str, Vec<&HashedImageResult>> = HashMap::new();
    let mut groups = Vec::new();

    for result in results {
        match result.hash(Sha256Hash::KEY) {
            Some(digest) => by_content.entry(digest).or_default().push(result),
            None => groups.push(ExactGroup {
                members: vec![result],
            }),
        }
    }

    groups.extend(by_content.into_values().map(|mut members| {
        members.sort_by(|a, b| rank(a, b));
        ExactGroup { members }
    }));

    groups.sort_by(|a, b| rank(a.representative(), b.representative()));
    groups
}

fn into_image_group(cluster: Cluster<'_>) -> ImageGroup {
    let mut members = cluster.members;
    members.sort_by(|a, b| rank(a, b));

    let images = members
        .iter()
        .map(|result| ImageEntry::from_result(result, false))
        .collect();
    // Sorted best first; the cluster representative ranks highest.
    ImageGroup::new(images, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hasher::{HashSource, Resolution};
    use crate::core::metadata::ExifData;
    use crate::core::scanner::FileIdentity;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    struct Photo {
        path: &'static str,
        sha: &'static str,
        size: u64,
        resolution: (u32, u32),
        phash: u64,
        dhash: u64,
        ahash: u64,
    }

    impl Photo {
        fn result(&self) -> HashedImageResult {
            let path = PathBuf::from(self.path);
            let identity = FileIdentity::new(
                path.file_name().unwrap().to_string_lossy(),
                path.parent().unwrap(),
                "jpg",
                self.size,
                0,
                ExifData::default(),
            );
            let (w, h) = self.resolution;
            let mut result = HashedImageResult::new(identity, HashSource::Fresh)
                .with_resolution(Resolution::new(w, h));
            result.insert_value("SHA256", self.sha);
            result.insert_value("Perceptual Hash", format!("{:016X}", self.phash));
            result.insert_value("Difference Hash", format!("{:016X}", self.dhash));
            result.insert_value("Average Hash", format!("{:016X}", self.ahash));
            result.insert_value("Aspect Ratio", format!("{:.6}", w as f64 / h as f64));
            result
        }
    }

    fn engine() -> SimilarityEngine {
        SimilarityEngine::new(SimilarityConfig::default(), &HashCatalog::new())
    }

    fn membership(groups: &[ImageGroup]) -> BTreeSet<BTreeSet<PathBuf>> {
        groups
            .iter()
            .map(|g| g.images.iter().map(|i| i.path.clone()).collect())
            .collect()
    }

    const BASE: u64 = 0x0F0F_3C3C_A5A5_F00F;

    fn three_photo_scenario() -> Vec<HashedImageResult> {
        vec![
            Photo {
                path: "/photos/copy.jpg",
                sha: "aaaa",
                size: 5000,
                resolution: (4000, 3000),
                phash: BASE,
                dhash: BASE,
                ahash: BASE,
            }
            .result(),
            Photo {
                path: "/photos/small.jpg",
                sha: "bbbb",
                size: 800,
                resolution: (800, 600),
                // Three bits off: 61/64 = 0.953 per hash
                phash: BASE ^ 0b111,
                dhash: BASE ^ 0b111,
                ahash: BASE ^ 0b111,
            }
            .result(),
            Photo {
                path: "/photos/original.jpg",
                sha: "aaaa",
                size: 5000,
                resolution: (4000, 3000),
                phash: BASE,
                dhash: BASE,
                ahash: BASE,
            }
            .result(),
        ]
    }

    #[test]
    fn identical_pair_and_reencode_form_one_group() {
        let groups = engine().group(&three_photo_scenario());

        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.len(), 3);
        assert_eq!(group.images.iter().filter(|i| i.is_best).count(), 1);

        let best = group.best().unwrap();
        assert_eq!(best.resolution, Resolution::new(4000, 3000));
        // Equal rank falls back to path order
        assert_eq!(best.path, PathBuf::from("/photos/copy.jpg"));
        assert_eq!(group.reclaimable_bytes(), 5800);
    }

    #[test]
    fn unrelated_images_are_not_grouped() {
        let results = vec![
            Photo {
                path: "/a.jpg",
                sha: "1111",
                size: 100,
                resolution: (100, 100),
                phash: 0x0000_0000_FFFF_FFFF,
                dhash: 0x5555_5555_5555_5555,
                ahash: 0x00FF_00FF_00FF_00FF,
            }
            .result(),
            Photo {
                path: "/b.jpg",
                sha: "2222",
                size: 100,
                resolution: (160, 90),
                phash: 0xFFFF_FFFF_0000_0000,
                dhash: 0xAAAA_AAAA_AAAA_AAAA,
                ahash: 0xFF00_FF00_FF00_FF00,
            }
            .result(),
        ];

        let engine = engine();
        assert!(engine.confidence(&results[0], &results[1]) < 0.80);
        assert!(engine.group(&results).is_empty());
    }

    #[test]
    fn grouping_does_not_depend_on_input_order() {
        let engine = engine();
        let mut results = three_photo_scenario();
        results.push(
            Photo {
                path: "/photos/other.jpg",
                sha: "cccc",
                size: 700,
                resolution: (640, 480),
                phash: !BASE,
                dhash: !BASE,
                ahash: !BASE,
            }
            .result(),
        );
        let expected = membership(&engine.group(&results));

        for shift in 1..results.len() {
            let mut rotated = results.clone();
            rotated.rotate_left(shift);
            assert_eq!(membership(&engine.group(&rotated)), expected);
        }
        results.reverse();
        assert_eq!(membership(&engine.group(&results)), expected);
    }

    #[test]
    fn exact_duplicates_group_without_perceptual_methods() {
        let catalog = HashCatalog::new().with_enabled(["SHA256"]).unwrap();
        let engine = SimilarityEngine::new(SimilarityConfig::default(), &catalog);

        let mut a = HashedImageResult::new(
            FileIdentity::new("a.png", "/p", "png", 10, 0, ExifData::default()),
            HashSource::Fresh,
        );
        a.insert_value("SHA256", "same");
        let mut b = HashedImageResult::new(
            FileIdentity::new("b.png", "/p", "png", 10, 0, ExifData::default()),
            HashSource::Fresh,
        );
        b.insert_value("SHA256", "same");

        let groups = engine.group(&[a, b]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn results_without_content_hash_stand_alone() {
        let engine = engine();
        let a = three_photo_scenario().remove(0);
        let identity = FileIdentity::new("broken.jpg", "/p", "jpg", 10, 0, ExifData::default());
        let mut broken = HashedImageResult::new(identity, HashSource::Error);
        broken.record_failure("SHA256", "unreadable");
        broken.record_failure("Perceptual Hash", "decode failed");

        assert_eq!(engine.confidence(&a, &broken), 0.0);
        assert!(engine.group(&[a, broken]).is_empty());
    }

    #[test]
    fn failed_slots_do_not_lower_confidence() {
        let engine = engine();
        let results = three_photo_scenario();
        let full = engine.confidence(&results[0], &results[1]);

        let mut partial = HashedImageResult::new(results[1].identity().clone(), HashSource::Error)
            .with_resolution(results[1].resolution());
        for key in ["Perceptual Hash", "Difference Hash", "Aspect Ratio"] {
            partial.insert_value(key, results[1].hash(key).unwrap());
        }
        partial.record_failure("Average Hash", "boom");

        let without_average = engine.confidence(&results[0], &partial);
        assert!((without_average - full).abs() < 0.01);
        assert!(without_average >= 0.90);
    }

    #[test]
    fn first_matching_cluster_wins() {
        // Two clusters both within reach of a third image; it joins the
        // one whose representative ranks higher, even though it is the
        // closer match to the other.
        let engine = engine();
        let high = Photo {
            path: "/high.jpg",
            sha: "h",
            size: 10,
            resolution: (3000, 2000),
            phash: BASE,
            dhash: BASE,
            ahash: BASE,
        }
        .result();
        let middle = Photo {
            path: "/middle.jpg",
            sha: "m",
            size: 10,
            resolution: (1500, 1000),
            phash: BASE ^ 0xFF,
            dhash: BASE ^ 0xFF,
            ahash: BASE ^ 0xFF,
        }
        .result();
        let low = Photo {
            path: "/low.jpg",
            sha: "l",
            size: 10,
            resolution: (300, 200),
            phash: BASE ^ 0x3F,
            dhash: BASE ^ 0x3F,
            ahash: BASE ^ 0x3F,
        }
        .result();

        assert!(engine.confidence(&high, &middle) < 0.90);
        assert!(engine.confidence(&low, &high) >= 0.90);
        assert!(engine.confidence(&low, &middle) > engine.confidence(&low, &high));

        let groups = engine.group(&[low, middle, high]);
        assert_eq!(groups.len(), 1);
        let paths: Vec<_> = groups[0].images.iter().map(|i| i.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/high.jpg"), PathBuf::from("/low.jpg")]);
    }
}
