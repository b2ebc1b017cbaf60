//! Durable storage for the accepted value
//!
//! Each node persists the value it last accepted, keyed as a single
//! row; a successful Accept overwrites the previous row.

use crate::error::StorageError;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

/// Persistence seam for the acceptor. A failed `persist` turns the
/// corresponding Accept into a decline.
pub trait ValueStore: Send + Sync {
    fn persist(&self, proposal: u64, value: &str) -> Result<(), StorageError>;
    fn load(&self) -> Result<(u64, String), StorageError>;
}

/// SQLite-backed store used by the node process.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the schema. Idempotent.
    pub fn init(&self) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "CREATE TABLE IF NOT EXISTS accepted_value (
                id        INTEGER PRIMARY KEY CHECK (id = 1),
                proposal  INTEGER NOT NULL,
                value     TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl ValueStore for SqliteStore {
    fn persist(&self, proposal: u64, value: &str) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "INSERT INTO accepted_value (id, proposal, value) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET proposal = excluded.proposal, value = excluded.value",
            params![proposal, value],
        )?;
        debug!(proposal, value, "accepted value persisted");
        Ok(())
    }

    fn load(&self) -> Result<(u64, String), StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT proposal, value FROM accepted_value WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok((row.get(0)?, row.get(1)?)),
            None => Err(StorageError::Empty),
        }
    }
}

/// In-memory store for simulated clusters and tests.
#[derive(Default)]
pub struct MemoryStore {
    last: Mutex<Option<(u64, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl ValueStore for MemoryStore {
    fn persist(&self, proposal: u64, value: &str) -> Result<(), StorageError> {
        *self.last.lock() = Some((proposal, value.to_string()));
        Ok(())
    }

    fn load(&self) -> Result<(u64, String), StorageError> {
        self.last.lock().clone().ok_or(StorageError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_sqlite_store_init() {
        let test_db = "test_accepted_value_init.db";
        let store = SqliteStore::new(test_db).unwrap();
        assert!(store.init().is_ok());
        // Re-running init on an existing schema is fine
        assert!(store.init().is_ok());

        fs::remove_file(test_db).ok();
    }

    #[test]
    fn test_sqlite_store_load_empty() {
        let test_db = "test_accepted_value_empty.db";
        let store = SqliteStore::new(test_db).unwrap();
        store.init().unwrap();

        assert!(matches!(store.load(), Err(StorageError::Empty)));

        fs::remove_file(test_db).ok();
    }

    #[test]
    fn test_sqlite_store_persist_and_load() {
        let test_db = "test_accepted_value_rw.db";
        let store = SqliteStore::new(test_db).unwrap();
        store.init().unwrap();

        store.persist(7, "hello").unwrap();
        assert_eq!(store.load().unwrap(), (7, "hello".to_string()));

        // A later accept overwrites the single row
        store.persist(12, "world").unwrap();
        assert_eq!(store.load().unwrap(), (12, "world".to_string()));

        fs::remove_file(test_db).ok();
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(matches!(store.load(), Err(StorageError::Empty)));

        store.persist(3, "v").unwrap();
        assert_eq!(store.load().unwrap(), (3, "v".to_string()));
    }
}
