//! Caches that never hit.

use super::{CacheFactory, CacheLookupResult, CacheQuery, CacheStats, HashCache, ScanGeneration};
use crate::core::hasher::{HashedImageResult, MethodVersions};
use crate::error::CacheError;
use std::path::Path;

/// Caching disabled: every lookup misses and stores are discarded
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl HashCache for NullCache {
    fn lookup(&self, _query: &CacheQuery) -> CacheLookupResult {
        CacheLookupResult::Miss
    }

    fn store(&self, _result: &HashedImageResult, _versions: &MethodVersions) -> Result<(), CacheError> {
        Ok(())
    }

    fn begin_scan(&self) -> Result<ScanGeneration, CacheError> {
        Ok(ScanGeneration(0))
    }

    fn prune(&self, _root: &Path, _recursive: bool) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats::default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheFactory;

impl CacheFactory for NullCacheFactory {
    fn open(&self) -> Result<Box<dyn HashCache>, CacheError> {
        Ok(Box::new(NullCache))
    }

    fn describe(&self) -> String {
        "disabled".to_string()
    }
}

/// Stands in for a cache that failed to open.
///
/// Lookups report `Error`, which callers treat as a miss; stores fail.
#[derive(Debug, Clone)]
pub struct UnavailableCache {
    reason: String,
}

impl UnavailableCache {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> CacheError {
        CacheError::Unavailable {
            reason: self.reason.clone(),
        }
    }
}

impl HashCache for UnavailableCache {
    fn lookup(&self, _query: &CacheQuery) -> CacheLookupResult {
        CacheLookupResult::Error(self.error())
    }

    fn store(&self, _result: &HashedImageResult, _versions: &MethodVersions) -> Result<(), CacheError> {
        Err(self.error())
    }

    fn begin_scan(&self) -> Result<ScanGeneration, CacheError> {
        Err(self.error())
    }

    fn prune(&self, _root: &Path, _recursive: bool) -> Result<usize, CacheError> {
        Err(self.error())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        Err(self.error())
    }
}
