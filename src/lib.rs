//! # PhotoBoss
//!
//! Finds duplicate and near-duplicate photos across a directory tree and groups
//! them for review.
//!
//! ## Core Philosophy
//! - **Never delete** - the library classifies and presents, nothing more
//! - **Cache everything** - a rescan only hashes new or modified files
//! - **Degrade, don't abort** - unreadable files and failing hashes are omitted
//!
//! ## Architecture
//! Every step runs as its own pipeline stage connected by bounded queues:
//! scanner, cache lookup, disk reader, hash workers, cache store and the
//! result collector that runs the similarity engine.
//! - `core` - The detection engine (queues, stages, cache, hashing, grouping)
//! - `events` - Progress and status reporting for any front end
//! - `error` - Error types

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{PhotoBossError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. `RUST_LOG` wins
/// when set; otherwise `verbose` picks debug over warn.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "photoboss=debug" } else { "photoboss=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default tracing subscriber");
}
