//! Event type definitions for status and progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::hasher::HashSource;
use crate::core::similarity::ImageGroup;

/// All events emitted by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Controller-level events and user-facing status strings
    Pipeline(PipelineEvent),
    /// Directory scanner events
    Scan(ScanEvent),
    /// Cache lookup and store events
    Cache(CacheEvent),
    /// Disk reader events
    Read(ReadEvent),
    /// Hash worker events
    Hash(HashEvent),
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Controller moved to a new state
    StateChanged { state: PipelineState },
    /// Free-form status line for the user
    Status { message: String },
    /// Grouping finished; the final result for presentation
    GroupsReady { groups: Vec<ImageGroup> },
    /// Pipeline drained and every stage has stopped
    Completed { summary: PipelineSummary },
    /// Pipeline was stopped before draining
    Cancelled,
}

/// Lifecycle of a pipeline controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    Scanning,
    Stopping,
    Stopped,
}

/// Events from the directory scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    Started { root: PathBuf, recursive: bool },
    Progress {
        files_scanned: usize,
        current_path: PathBuf,
    },
    Completed { total_files: usize, cancelled: bool },
}

/// Events from the cache lookup and cache store stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEvent {
    LookupProgress { hits: usize, misses: usize },
    /// A cache operation failed; the pipeline carries on without it
    Error { message: String },
    Pruned { removed: usize },
}

/// Events from the disk reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReadEvent {
    /// Position within the current batch
    Progress { current: usize, total: usize },
}

/// Events from the hash workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    Hashed { path: PathBuf, source: HashSource },
    Failed {
        path: PathBuf,
        method: String,
        message: String,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Files that reached the result collector
    pub total_files: usize,
    pub cache_hits: usize,
    /// Files hashed in this run
    pub hashed: usize,
    /// Files with at least one failed hash slot
    pub errors: usize,
    pub duplicate_groups: usize,
    /// Grouped files excluding each group's best entry
    pub duplicate_count: usize,
    /// Bytes held by the non-best entries
    pub reclaimable_bytes: u64,
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Scanning => write!(f, "Scanning"),
            PipelineState::Stopping => write!(f, "Stopping"),
            PipelineState::Stopped => write!(f, "Stopped"),
        }
    }
}
