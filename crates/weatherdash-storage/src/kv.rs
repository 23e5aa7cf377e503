//! String-keyed durable stores.
//!
//! `SqliteStore` is the on-disk backend; several processes may share one
//! database file, and each row carries a revision so a process can tell which
//! keys someone else wrote. `MemoryStore` backs tests and ephemeral sessions.

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

use crate::error::StorageResult;

/// Minimal string-keyed, string-valued durable store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Keys changed by another process since the previous call.
    ///
    /// Backends without a shared medium never observe outside writes.
    fn external_changes(&self) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// In-process store with no durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }
}

/// SQLite-backed store: one `kv` table, one row per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Last revision this process wrote or observed, per key
    seen: Mutex<HashMap<String, i64>>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 1
            );
            "#,
        )?;

        let seen = Self::revisions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            seen: Mutex::new(seen),
        })
    }

    fn revisions(conn: &Connection) -> StorageResult<HashMap<String, i64>> {
        let mut stmt = conn.prepare("SELECT key, revision FROM kv")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        let revision: i64 = conn.query_row(
            r#"
            INSERT INTO kv (key, value, revision) VALUES (?1, ?2, 1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, revision = kv.revision + 1
            RETURNING revision
            "#,
            params![key, value],
            |row| row.get(0),
        )?;
        self.seen.lock().insert(key.to_string(), revision);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        self.seen.lock().remove(key);
        Ok(())
    }

    fn external_changes(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock();
        let current = Self::revisions(&conn)?;
        let mut seen = self.seen.lock();

        let mut changed: Vec<String> = current
            .iter()
            .filter(|(key, rev)| seen.get(*key) != Some(*rev))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(seen.keys().filter(|key| !current.contains_key(*key)).cloned());
        changed.sort();

        *seen = current;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_overwrite() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");

        SqliteStore::open(&path).unwrap().set("k", "v").unwrap();
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_own_writes_are_not_external() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert!(store.external_changes().unwrap().is_empty());
    }

    #[test]
    fn test_detects_writes_from_another_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.db");

        let ours = SqliteStore::open(&path).unwrap();
        let theirs = SqliteStore::open(&path).unwrap();
        ours.set("untouched", "x").unwrap();
        theirs.external_changes().unwrap();

        theirs.set("weather:activeLocation:v1", "{\"kind\":\"geo\"}").unwrap();
        assert_eq!(
            ours.external_changes().unwrap(),
            vec!["weather:activeLocation:v1".to_string()]
        );
        // Reported once
        assert!(ours.external_changes().unwrap().is_empty());

        theirs.remove("untouched").unwrap();
        assert_eq!(ours.external_changes().unwrap(), vec!["untouched".to_string()]);
    }
}
