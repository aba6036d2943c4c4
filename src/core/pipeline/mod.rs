//! # Pipeline Module
//!
//! Wires the stages into a running scan.
//!
//! ## Stages
//! ```text
//! DirectoryScanner --scan--> CacheLookup --disk--> DiskReader --read--> HashWorker xN
//!                                 |                                         |
//!                                 | hits                                 hashed
//!                                 v                                         v
//!                          ResultCollector <--------results---------- CacheStore
//! ```
//!
//! Every stage runs on its own named thread. Queues close when their last
//! producer stops, so a finished scan drains stage by stage without a
//! coordinator. [`PipelineController::stop`] cancels the shared token and
//! closes every queue at once.

mod controller;
mod stages;

pub use controller::{PipelineBuilder, PipelineController, StopHandle};
pub use stages::{CacheLookupStage, CacheStore, HashWorker, ResultCollector};

use crate::core::scanner::ScanConfig;
use crate::core::similarity::ImageGroup;
use crate::events::PipelineSummary;
use serde::{Deserialize, Serialize};

/// Capacity of each inter-stage queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCapacities {
    /// Identity batches from the scanner
    pub scan: usize,
    /// Cache-miss batches for the disk reader
    pub disk: usize,
    /// File contents waiting for a hash worker
    pub read: usize,
    /// Fresh results waiting to be stored
    pub hashed: usize,
    /// Results for the collector
    pub results: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            scan: 100,
            disk: 50,
            read: 32,
            hashed: 200,
            results: 500,
        }
    }
}

/// Configuration for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parallel hash workers
    pub workers: usize,
    pub capacities: QueueCapacities,
    pub scan: ScanConfig,
    /// Files between disk reader progress events
    pub disk_progress_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            capacities: QueueCapacities::default(),
            scan: ScanConfig::default(),
            disk_progress_interval: 50,
        }
    }
}

/// One fewer than the available cores, leaving room for the other stages
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Result of one scan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub groups: Vec<ImageGroup>,
    /// Files that reached the result collector
    pub total_files: usize,
    pub cache_hits: usize,
    /// Files hashed in this run
    pub hashed: usize,
    /// Files with at least one failed hash slot
    pub errors: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ScanReport {
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(ImageGroup::duplicate_count).sum()
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(ImageGroup::reclaimable_bytes).sum()
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            total_files: self.total_files,
            cache_hits: self.cache_hits,
            hashed: self.hashed,
            errors: self.errors,
            duplicate_groups: self.groups.len(),
            duplicate_count: self.duplicate_count(),
            reclaimable_bytes: self.reclaimable_bytes(),
            duration_ms: self.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(default_workers() >= 1);
        assert_eq!(PipelineConfig::default().disk_progress_interval, 50);
    }

    #[test]
    fn empty_report_summarizes_to_zero() {
        let summary = ScanReport::default().summary();
        assert_eq!(summary.duplicate_groups, 0);
        assert_eq!(summary.reclaimable_bytes, 0);
    }
}
