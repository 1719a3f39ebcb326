//! `SQLite`-backed key-value storage.
//!
//! Several processes may open the same database file; each sees the others'
//! committed writes on its next read. Change delivery between processes is
//! left to [`crate::watch::StorageWatcher`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{entry_size, migrations, KeyValueStorage};
use crate::error::{Error, Result};

/// Key-value storage in a single `SQLite` table.
#[derive(Debug)]
pub struct SqliteStorage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
    /// Maximum total bytes across all entries; 0 means unlimited.
    quota_bytes: usize,
}

impl SqliteStorage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening funnel database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets readers in other processes proceed while one writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;

        migrations::initialize_schema(&conn)?;

        info!("Funnel database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            quota_bytes: 0,
        })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
            quota_bytes: 0,
        })
    }

    /// Reject writes that would push the table past `quota_bytes`.
    ///
    /// A quota of 0 disables the limit.
    #[must_use]
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))?;
        Ok(count)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("sqlite connection lock poisoned"))
    }

    fn bytes_excluding(conn: &Connection, key: &str) -> Result<usize> {
        let total: i64 = conn.query_row(
            r"
            SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0)
            FROM kv_store WHERE key != ?1
            ",
            [key],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(total).unwrap_or(usize::MAX))
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;

        if self.quota_bytes > 0 {
            let required = Self::bytes_excluding(&conn, key)? + entry_size(key, value);
            if required > self.quota_bytes {
                return Err(Error::QuotaExceeded {
                    key: key.to_string(),
                    required,
                    limit: self.quota_bytes,
                });
            }
        }

        conn.execute(
            r"
            INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        if affected > 0 {
            debug!("Removed {}", key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        let affected = conn.execute("DELETE FROM kv_store", [])?;
        info!("Cleared {} stored keys", affected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().expect("failed to create test storage")
    }

    #[test]
    fn test_open_in_memory() {
        let storage = SqliteStorage::open_in_memory();
        assert!(storage.is_ok());
        assert_eq!(storage.unwrap().path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_set_and_get() {
        let storage = create_test_storage();
        storage.set_item("funnel", r#"{"sessionId":"s1"}"#).unwrap();
        assert_eq!(
            storage.get_item("funnel").unwrap().as_deref(),
            Some(r#"{"sessionId":"s1"}"#)
        );
    }

    #[test]
    fn test_get_missing() {
        let storage = create_test_storage();
        assert!(storage.get_item("missing").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_value() {
        let storage = create_test_storage();
        storage.set_item("k", "one").unwrap();
        storage.set_item("k", "two").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("two"));
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = create_test_storage();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();

        storage.remove_item("a").unwrap();
        assert!(storage.get_item("a").unwrap().is_none());
        assert!(storage.remove_item("a").is_ok());

        storage.clear().unwrap();
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_quota_rejects_write_and_keeps_old_value() {
        let storage = create_test_storage().with_quota(12);
        storage.set_item("key", "short").unwrap();

        let err = storage.set_item("key", "much too long").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.get_item("key").unwrap().as_deref(), Some("short"));
    }

    #[test]
    fn test_unicode_value() {
        let storage = create_test_storage();
        storage.set_item("k", "Hello 世界 🌍").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("Hello 世界 🌍"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/deeper/funnel.db");

        let storage = SqliteStorage::open(&nested).unwrap();
        assert!(nested.exists());
        assert_eq!(storage.path(), nested);
    }

    #[test]
    fn test_two_connections_share_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");

        let first = SqliteStorage::open(&path).unwrap();
        let second = SqliteStorage::open(&path).unwrap();

        first.set_item("k", "from first").unwrap();
        assert_eq!(
            second.get_item("k").unwrap().as_deref(),
            Some("from first")
        );
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");

        {
            let storage = SqliteStorage::open(&path).unwrap();
            storage.set_item("k", "kept").unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("kept"));
    }
}
