//! Cache trait definitions.

use super::{CacheLookupResult, CacheQuery, CacheStats, ScanGeneration, UnavailableCache};
use crate::core::hasher::{HashedImageResult, MethodVersions};
use crate::error::CacheError;
use std::path::Path;
use tracing::warn;

/// A handle on the hash cache.
///
/// Handles are not shared between stages; each stage opens its own
/// through a [`CacheFactory`].
pub trait HashCache: Send {
    /// Find the stored hashes for a file.
    ///
    /// A hit stamps the file with the current scan generation.
    fn lookup(&self, query: &CacheQuery) -> CacheLookupResult;

    /// Store every successful hash slot of `result` in one transaction.
    fn store(&self, result: &HashedImageResult, versions: &MethodVersions) -> Result<(), CacheError>;

    /// Start a new scan generation
    fn begin_scan(&self) -> Result<ScanGeneration, CacheError>;

    /// Remove files in `root` (and below it, when `recursive`) that the
    /// current scan generation did not touch. Returns the number removed.
    fn prune(&self, root: &Path, recursive: bool) -> Result<usize, CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Opens cache handles
pub trait CacheFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn HashCache>, CacheError>;

    /// Human-readable location, for status messages
    fn describe(&self) -> String;
}

/// Open a handle, degrading to an always-failing cache on error.
pub fn open_or_unavailable(factory: &dyn CacheFactory) -> Box<dyn HashCache> {
    match factory.open() {
        Ok(cache) => cache,
        Err(error) => {
            warn!(cache = %factory.describe(), %error, "hash cache unavailable");
            Box::new(UnavailableCache::new(error.to_string()))
        }
    }
}
