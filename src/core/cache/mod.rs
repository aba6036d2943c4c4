//! # Cache Module
//!
//! Persists computed hashes so unchanged files are never hashed twice.
//!
//! A file is looked up by its identity (name, directory, size, mtime); a hit
//! additionally requires compatible EXIF and every requested method stored
//! at the requested version or newer.
//!
//! ## Backends
//! - `SqliteHashCache` - persistent, schema-versioned SQLite store
//! - `InMemoryHashCache` - shared in-process store, for tests
//! - `NullCache` / `UnavailableCache` - always miss
//!
//! Each pipeline stage opens its own handle through a [`CacheFactory`].

mod fallback;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use fallback::{NullCache, NullCacheFactory, UnavailableCache};
pub use memory::InMemoryHashCache;
pub use schema::SCHEMA_VERSION;
pub use sqlite::{SqliteCacheFactory, SqliteHashCache};
pub use traits::{open_or_unavailable, CacheFactory, HashCache};

use crate::core::hasher::{HashedImageResult, MethodVersions};
use crate::core::scanner::FileIdentity;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name of the default cache database
pub const DEFAULT_CACHE_FILE: &str = "hash_cache.sqlite";

/// Default on-disk location: `<user cache dir>/photoboss/hash_cache.sqlite`
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("photoboss").join(DEFAULT_CACHE_FILE))
}

/// A hash method a lookup needs, with the minimum acceptable version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredMethod {
    pub key: String,
    pub version: u32,
}

impl RequiredMethod {
    pub fn new(key: impl Into<String>, version: u32) -> Self {
        Self {
            key: key.into(),
            version,
        }
    }
}

/// What to look up: one file and the hashes it must have
#[derive(Debug, Clone)]
pub struct CacheQuery {
    pub identity: FileIdentity,
    pub required: Vec<RequiredMethod>,
}

impl CacheQuery {
    pub fn new(identity: FileIdentity, versions: &MethodVersions) -> Self {
        Self {
            identity,
            required: versions
                .iter()
                .map(|(key, version)| RequiredMethod::new(key.clone(), *version))
                .collect(),
        }
    }
}

/// Outcome of [`HashCache::lookup`]
#[derive(Debug)]
pub enum CacheLookupResult {
    /// Every required hash was found; the result's source is `Cache`
    Hit(HashedImageResult),
    Miss,
    /// The cache could not answer; treat as a miss
    Error(CacheError),
}

impl CacheLookupResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookupResult::Hit(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, CacheLookupResult::Miss)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CacheLookupResult::Error(_))
    }

    pub fn into_hit(self) -> Option<HashedImageResult> {
        match self {
            CacheLookupResult::Hit(result) => Some(result),
            _ => None,
        }
    }
}

/// Identifier of one scan, stamped on every file it touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanGeneration(pub i64);

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of file rows
    pub files: usize,
    /// Number of stored hash values
    pub hashes: usize,
    pub schema_version: i64,
    pub last_scan_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::ExifData;

    #[test]
    fn query_requires_every_versioned_method() {
        let identity = FileIdentity::new("a.jpg", "/p", "jpg", 1, 2, ExifData::default());
        let versions: MethodVersions = [("SHA256".to_string(), 1), ("Average Hash".to_string(), 3)]
            .into_iter()
            .collect();

        let query = CacheQuery::new(identity, &versions);
        assert_eq!(
            query.required,
            vec![
                RequiredMethod::new("Average Hash", 3),
                RequiredMethod::new("SHA256", 1)
            ]
        );
    }

    #[test]
    fn lookup_result_accessors() {
        assert!(CacheLookupResult::Miss.is_miss());
        assert!(CacheLookupResult::Error(CacheError::QueryFailed("x".into())).is_error());
        assert!(CacheLookupResult::Miss.into_hit().is_none());
    }

    #[test]
    fn default_path_ends_with_cache_file() {
        if let Some(path) = default_cache_path() {
            assert!(path.ends_with("photoboss/hash_cache.sqlite"));
        }
    }
}
