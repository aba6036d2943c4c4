//! SQLite cache backend for persistent storage.

use super::schema;
use super::{CacheFactory, CacheLookupResult, CacheQuery, CacheStats, HashCache, ScanGeneration};
use crate::core::hasher::{HashSource, HashValue, HashedImageResult, MethodVersions, Resolution};
use crate::core::metadata::ExifData;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CURRENT_SCAN: &str = "(SELECT value FROM meta WHERE key = 'last_scan_id')";

/// SQLite-backed persistent cache
///
/// Uses WAL (Write-Ahead Logging) so the lookup and store stages can each
/// hold a connection to the same file.
pub struct SqliteHashCache {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteHashCache {
    /// Open or create a cache database at the given path, migrating it to
    /// the current schema.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let open_failed = |reason: String| CacheError::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| open_failed(e.to_string()))?;
        Self::with_connection(conn, path.to_path_buf())
    }

    /// Private in-memory database; mostly useful in tests
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PathBuf::from(":memory:"))
    }

    fn with_connection(mut conn: Connection, db_path: PathBuf) -> Result<Self, CacheError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        let version = schema::initialize(&mut conn)?;
        debug!(path = %db_path.display(), version, "hash cache opened");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Unavailable {
            reason: format!("connection lock poisoned for {}", self.db_path.display()),
        })
    }

    fn find(&self, query: &CacheQuery) -> Result<Option<HashedImageResult>, CacheError> {
        let conn = self.connection()?;
        let identity = &query.identity;

        let row = conn
            .prepare_cached(
                "SELECT f.id, f.width, f.height,
                        e.orientation, e.captured_at, e.make, e.model
                 FROM files f
                 LEFT JOIN file_exif e ON e.file_id = f.id
                 WHERE f.name = ?1 AND f.path = ?2 AND f.size = ?3 AND f.modified_time = ?4",
            )?
            .query_row(
                params![
                    identity.name(),
                    directory_key(identity.directory()),
                    identity.size() as i64,
                    identity.modified(),
                ],
                |row| {
                    let exif = ExifData {
                        orientation: row.get(3)?,
                        captured_at: row.get(4)?,
                        camera_make: row.get(5)?,
                        camera_model: row.get(6)?,
                    };
                    Ok((
                        row.get::<_, i64>(0)?,
                        Resolution::new(row.get(1)?, row.get(2)?),
                        exif,
                    ))
                },
            )
            .optional()?;

        let Some((file_id, resolution, cached_exif)) = row else {
            return Ok(None);
        };

        if !cached_exif.is_compatible_with(identity.exif()) {
            debug!(path = %identity.path().display(), "cached EXIF differs");
            return Ok(None);
        }

        let mut stmt = conn.prepare_cached(
            "SELECT h.hash_value, h.version, h.computed_at
             FROM hashes h
             JOIN hash_methods m ON m.id = h.method_id
             WHERE h.file_id = ?1 AND m.key = ?2",
        )?;

        let mut result = HashedImageResult::new(identity.clone(), HashSource::Cache)
            .with_resolution(resolution);
        let mut computed_at = i64::MIN;

        for required in &query.required {
            let stored = stmt
                .query_row(params![file_id, required.key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .optional()?;

            match stored {
                Some((value, version, at)) if version >= required.version as i64 => {
                    computed_at = computed_at.max(at);
                    result.insert_value(required.key.clone(), value);
                }
                _ => return Ok(None),
            }
        }

        conn.prepare_cached(&format!(
            "UPDATE files SET last_seen_scan = {CURRENT_SCAN} WHERE id = ?1"
        ))?
        .execute([file_id])?;

        let computed_at = DateTime::<Utc>::from_timestamp(computed_at, 0).unwrap_or_default();
        Ok(Some(result.with_computed_at(computed_at)))
    }
}

impl HashCache for SqliteHashCache {
    fn lookup(&self, query: &CacheQuery) -> CacheLookupResult {
        match self.find(query) {
            Ok(Some(result)) => CacheLookupResult::Hit(result),
            Ok(None) => CacheLookupResult::Miss,
            Err(error) => {
                warn!(path = %query.identity.path().display(), %error, "cache lookup failed");
                CacheLookupResult::Error(error)
            }
        }
    }

    fn store(&self, result: &HashedImageResult, versions: &MethodVersions) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let identity = result.identity();
        let directory = directory_key(identity.directory());
        let size = identity.size() as i64;
        let computed_at = result.computed_at().timestamp();

        let tx = conn.transaction()?;

        // Hashes of an older generation of this file are stale.
        tx.execute(
            "DELETE FROM hashes WHERE file_id IN (
                 SELECT id FROM files
                 WHERE name = ?1 AND path = ?2 AND (size != ?3 OR modified_time != ?4)
             )",
            params![identity.name(), directory, size, identity.modified()],
        )?;

        tx.execute(
            &format!(
                "INSERT INTO files
                     (name, path, extension, size, modified_time, width, height, last_seen_scan)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, {CURRENT_SCAN})
                 ON CONFLICT (name, path) DO UPDATE SET
                     extension = excluded.extension,
                     size = excluded.size,
                     modified_time = excluded.modified_time,
                     width = excluded.width,
                     height = excluded.height,
                     last_seen_scan = excluded.last_seen_scan"
            ),
            params![
                identity.name(),
                directory,
                identity.extension(),
                size,
                identity.modified(),
                result.resolution().width,
                result.resolution().height,
            ],
        )?;

        let file_id: i64 = tx.query_row(
            "SELECT id FROM files WHERE name = ?1 AND path = ?2",
            params![identity.name(), directory],
            |row| row.get(0),
        )?;

        for (key, slot) in result.hashes() {
            let HashValue::Value(value) = slot else {
                continue;
            };
            let version = versions.get(key).copied().unwrap_or(1);

            tx.execute(
                "INSERT INTO hash_methods (key, version) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET version = MAX(version, excluded.version)",
                params![key, version],
            )?;
            let method_id: i64 = tx.query_row(
                "SELECT id FROM hash_methods WHERE key = ?1",
                [key],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO hashes (file_id, method_id, hash_value, computed_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (file_id, method_id) DO UPDATE SET
                     hash_value = excluded.hash_value,
                     computed_at = excluded.computed_at,
                     version = excluded.version",
                params![file_id, method_id, value, computed_at, version],
            )?;
        }

        let exif = identity.exif();
        tx.execute(
            "INSERT INTO file_exif (file_id, orientation, captured_at, make, model)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (file_id) DO UPDATE SET
                 orientation = excluded.orientation,
                 captured_at = excluded.captured_at,
                 make = excluded.make,
                 model = excluded.model",
            params![
                file_id,
                exif.orientation,
                exif.captured_at,
                exif.camera_make,
                exif.camera_model,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn begin_scan(&self) -> Result<ScanGeneration, CacheError> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE meta SET value = value + 1 WHERE key = 'last_scan_id'",
            [],
        )?;
        let id = conn.query_row(
            "SELECT value FROM meta WHERE key = 'last_scan_id'",
            [],
            |row| row.get(0),
        )?;
        Ok(ScanGeneration(id))
    }

    fn prune(&self, root: &Path, recursive: bool) -> Result<usize, CacheError> {
        let conn = self.connection()?;
        let root = directory_key(root);
        let prefix = format!("{}{}", root.trim_end_matches(MAIN_SEPARATOR), MAIN_SEPARATOR);

        let removed = conn.execute(
            &format!(
                "DELETE FROM files
                 WHERE last_seen_scan != {CURRENT_SCAN}
                   AND (path = ?1 OR (?2 AND substr(path, 1, length(?3)) = ?3))"
            ),
            params![root, recursive, prefix],
        )?;

        debug!(%root, recursive, removed, "pruned stale cache rows");
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let conn = self.connection()?;
        let count = |sql: &str| -> Result<usize, CacheError> {
            Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as usize)
        };
        let meta = |key: &str| -> Result<i64, CacheError> {
            Ok(conn
                .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
                .optional()?
                .unwrap_or(0))
        };

        Ok(CacheStats {
            files: count("SELECT COUNT(*) FROM files")?,
            hashes: count("SELECT COUNT(*) FROM hashes")?,
            schema_version: meta("schema_version")?,
            last_scan_id: meta("last_scan_id")?,
        })
    }
}

/// Directory column value. Trailing separators and `.` segments are
/// dropped so the scanner and prune agree on the key.
fn directory_key(directory: &Path) -> String {
    let normalized: PathBuf = directory
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    normalized.to_string_lossy().into_owned()
}

/// Opens a [`SqliteHashCache`] per call, all on the same file
#[derive(Debug, Clone)]
pub struct SqliteCacheFactory {
    path: PathBuf,
}

impl SqliteCacheFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheFactory for SqliteCacheFactory {
    fn open(&self) -> Result<Box<dyn HashCache>, CacheError> {
        Ok(Box::new(SqliteHashCache::open(&self.path)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
