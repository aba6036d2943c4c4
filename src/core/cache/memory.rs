//! In-memory cache backend for testing.

use super::{CacheFactory, CacheLookupResult, CacheQuery, CacheStats, HashCache, ScanGeneration, SCHEMA_VERSION};
use crate::core::hasher::{HashSource, HashValue, HashedImageResult, MethodVersions, Resolution};
use crate::core::metadata::ExifData;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct StoredHash {
    value: String,
    version: u32,
    computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    size: u64,
    modified: i64,
    resolution: Resolution,
    exif: ExifData,
    hashes: BTreeMap<String, StoredHash>,
    last_seen_scan: i64,
}

#[derive(Debug, Default)]
struct State {
    files: HashMap<(PathBuf, String), StoredFile>,
    last_scan_id: i64,
}

/// In-memory cache backend
///
/// Clones share one store, so the same value serves as its own
/// [`CacheFactory`]. Matching rules are the same as the SQLite backend's.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHashCache {
    state: Arc<RwLock<State>>,
}

impl InMemoryHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, CacheError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, CacheError> {
        self.state.write().map_err(|_| poisoned())
    }

    fn find(&self, query: &CacheQuery) -> Result<Option<HashedImageResult>, CacheError> {
        let mut state = self.write()?;
        let scan = state.last_scan_id;
        let identity = &query.identity;
        let key = (identity.directory().to_path_buf(), identity.name().to_string());

        let Some(file) = state.files.get_mut(&key) else {
            return Ok(None);
        };
        if file.size != identity.size()
            || file.modified != identity.modified()
            || !file.exif.is_compatible_with(identity.exif())
        {
            return Ok(None);
        }

        let mut result = HashedImageResult::new(identity.clone(), HashSource::Cache)
            .with_resolution(file.resolution);
        let mut computed_at = DateTime::<Utc>::MIN_UTC;
        for required in &query.required {
            match file.hashes.get(&required.key) {
                Some(stored) if stored.version >= required.version => {
                    computed_at = computed_at.max(stored.computed_at);
                    result.insert_value(required.key.clone(), stored.value.clone());
                }
                _ => return Ok(None),
            }
        }

        file.last_seen_scan = scan;
        Ok(Some(result.with_computed_at(computed_at)))
    }
}

fn poisoned() -> CacheError {
    CacheError::Unavailable {
        reason: "in-memory cache lock poisoned".to_string(),
    }
}

impl HashCache for InMemoryHashCache {
    fn lookup(&self, query: &CacheQuery) -> CacheLookupResult {
        match self.find(query) {
            Ok(Some(result)) => CacheLookupResult::Hit(result),
            Ok(None) => CacheLookupResult::Miss,
            Err(error) => CacheLookupResult::Error(error),
        }
    }

    fn store(&self, result: &HashedImageResult, versions: &MethodVersions) -> Result<(), CacheError> {
        let mut state = self.write()?;
        let scan = state.last_scan_id;
        let identity = result.identity();
        let key = (identity.directory().to_path_buf(), identity.name().to_string());

        let file = state.files.entry(key).or_insert_with(|| StoredFile {
            size: identity.size(),
            modified: identity.modified(),
            resolution: Resolution::default(),
            exif: ExifData::default(),
            hashes: BTreeMap::new(),
            last_seen_scan: scan,
        });

        if file.size != identity.size() || file.modified != identity.modified() {
            file.hashes.clear();
        }
        file.size = identity.size();
        file.modified = identity.modified();
        file.resolution = result.resolution();
        file.exif = identity.exif().clone();
        file.last_seen_scan = scan;

        for (method, slot) in result.hashes() {
            if let HashValue::Value(value) = slot {
                file.hashes.insert(
                    method.clone(),
                    StoredHash {
                        value: value.clone(),
                        version: versions.get(method).copied().unwrap_or(1),
                        computed_at: result.computed_at(),
                    },
                );
            }
        }
        Ok(())
    }

    fn begin_scan(&self) -> Result<ScanGeneration, CacheError> {
        let mut state = self.write()?;
        state.last_scan_id += 1;
        Ok(ScanGeneration(state.last_scan_id))
    }

    fn prune(&self, root: &Path, recursive: bool) -> Result<usize, CacheError> {
        let mut state = self.write()?;
        let scan = state.last_scan_id;
        let before = state.files.len();

        state.files.retain(|(directory, _), file| {
            let in_scope = if recursive {
                directory.starts_with(root)
            } else {
                directory.as_path() == root
            };
            !in_scope || file.last_seen_scan == scan
        });

        Ok(before - state.files.len())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let state = self.read()?;
        Ok(CacheStats {
            files: state.files.len(),
            hashes: state.files.values().map(|f| f.hashes.len()).sum(),
            schema_version: SCHEMA_VERSION,
            last_scan_id: state.last_scan_id,
        })
    }
}

impl CacheFactory for InMemoryHashCache {
    fn open(&self) -> Result<Box<dyn HashCache>, CacheError> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}
