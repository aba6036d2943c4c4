//! # Error Module
//!
//! Error types for the duplicate photo finder.
//!
//! Per-file problems (unreadable files, undecodable images, one failing hash
//! method) are recorded on the result and never surface here as fatal errors.
//! Cache failures degrade to cache misses. Only configuration problems stop a
//! pipeline from starting.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum PhotoBossError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur during photo scanning
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    ReadEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur while reading or hashing an image
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to decode image {path}: {reason}")]
    DecodeError { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },

    #[error("Hash computation failed: {0}")]
    ComputationFailed(String),

    #[error("Failed to read image file {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that occur with the hash cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Cache schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("Migration to schema version {version} failed: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Cache is unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Errors that prevent a pipeline from being (re)started
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Please enable at least one hash method")]
    NoActiveMethods,

    #[error("Unknown hash method: {key}")]
    UnknownMethod { key: String },

    #[error("A scan is already running")]
    AlreadyRunning,

    #[error("No scan has been started")]
    NotStarted,

    #[error("Failed to spawn stage {stage}: {reason}")]
    SpawnFailed { stage: String, reason: String },

    #[error("Stage {stage} panicked")]
    StagePanicked { stage: String },
}

impl From<rusqlite::Error> for CacheError {
    fn from(error: rusqlite::Error) -> Self {
        CacheError::QueryFailed(error.to_string())
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, PhotoBossError>;
