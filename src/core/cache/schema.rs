//! Schema creation and migrations for the SQLite cache.
//!
//! The layout is versioned through the `schema_version` row of `meta`.
//! Opening a database creates the base (version 0) tables when missing,
//! then applies every numbered migration above the stored version, each in
//! its own transaction. Migrations only add; none drops or rewrites rows.

use crate::error::CacheError;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = 2;

const BASE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
    INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', 0);

    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        path TEXT NOT NULL,
        extension TEXT NOT NULL,
        size INTEGER NOT NULL,
        modified_time INTEGER NOT NULL,
        width INTEGER NOT NULL DEFAULT 0,
        height INTEGER NOT NULL DEFAULT 0,
        UNIQUE (name, path)
    );

    CREATE TABLE IF NOT EXISTS hash_methods (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key TEXT NOT NULL UNIQUE,
        version INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS hashes (
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        method_id INTEGER NOT NULL REFERENCES hash_methods(id) ON DELETE CASCADE,
        hash_value TEXT NOT NULL,
        computed_at INTEGER NOT NULL,
        PRIMARY KEY (file_id, method_id)
    );
";

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "
            CREATE TABLE IF NOT EXISTS file_exif (
                file_id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE,
                orientation INTEGER,
                captured_at INTEGER,
                make TEXT,
                model TEXT
            );
        ",
    },
    Migration {
        version: 2,
        sql: "
            ALTER TABLE files ADD COLUMN last_seen_scan INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE hashes ADD COLUMN version INTEGER NOT NULL DEFAULT 1;
            INSERT OR IGNORE INTO meta (key, value) VALUES ('last_scan_id', 0);
            CREATE INDEX IF NOT EXISTS idx_files_path ON files(path);
        ",
    },
];

/// Stored schema version, or `None` if `meta` has no version row
pub fn stored_version(conn: &Connection) -> Result<Option<i64>, CacheError> {
    let has_meta: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'meta')",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?)
}

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// Returns the final version. A database written by a newer build is left
/// untouched and reported as [`CacheError::SchemaTooNew`].
pub fn initialize(conn: &mut Connection) -> Result<i64, CacheError> {
    if let Some(found) = stored_version(conn)? {
        if found > SCHEMA_VERSION {
            return Err(CacheError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            });
        }
    }

    conn.execute_batch(BASE_TABLES)?;

    for migration in MIGRATIONS {
        apply(conn, migration)?;
    }

    stored_version(conn)?.ok_or_else(|| CacheError::QueryFailed("schema version row missing".into()))
}

fn apply(conn: &mut Connection, migration: &Migration) -> Result<(), CacheError> {
    let failed = |error: rusqlite::Error| CacheError::MigrationFailed {
        version: migration.version,
        reason: error.to_string(),
    };

    // Take the write lock before reading the version so concurrent openers
    // cannot apply the same step twice.
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(failed)?;
    let current: i64 = tx
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map_err(failed)?;
    if current >= migration.version {
        return Ok(());
    }

    tx.execute_batch(migration.sql).map_err(failed)?;
    tx.execute(
        "UPDATE meta SET value = ?1 WHERE key = 'schema_version'",
        [migration.version],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)?;

    info!(version = migration.version, "hash cache schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})")).unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(initialize(&mut conn).unwrap(), SCHEMA_VERSION);
        assert!(columns(&conn, "files").contains(&"last_seen_scan".to_string()));
        assert!(columns(&conn, "hashes").contains(&"version".to_string()));
        assert!(columns(&conn, "file_exif").contains(&"orientation".to_string()));
    }

    #[test]
    fn version_zero_database_migrates_without_losing_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(BASE_TABLES).unwrap();
        conn.execute_batch(
            "INSERT INTO files (name, path, extension, size, modified_time, width, height)
                 VALUES ('a.jpg', '/photos', 'jpg', 10, 20, 640, 480);
             INSERT INTO hash_methods (key, version) VALUES ('SHA256', 1);
             INSERT INTO hashes (file_id, method_id, hash_value, computed_at)
                 VALUES (1, 1, 'abc', 30);",
        )
        .unwrap();
        assert_eq!(stored_version(&conn).unwrap(), Some(0));

        assert_eq!(initialize(&mut conn).unwrap(), 2);

        let (name, width, seen): (String, i64, i64) = conn
            .query_row("SELECT name, width, last_seen_scan FROM files", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!((name.as_str(), width, seen), ("a.jpg", 640, 0));

        let (value, version): (String, i64) = conn
            .query_row("SELECT hash_value, version FROM hashes", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!((value.as_str(), version), ("abc", 1));

        let last_scan: i64 = conn
            .query_row("SELECT value FROM meta WHERE key = 'last_scan_id'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(last_scan, 0);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        assert_eq!(initialize(&mut conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_rejected_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE meta (key TEXT PRIMARY KEY, value INTEGER NOT NULL);
             INSERT INTO meta (key, value) VALUES ('schema_version', 99);",
        )
        .unwrap();

        let error = initialize(&mut conn).unwrap_err();
        assert!(matches!(error, CacheError::SchemaTooNew { found: 99, .. }));
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }
}
