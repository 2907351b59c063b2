//! Session id persistence using SQLite
//!
//! The browser widget this mirrors keeps exactly one string in local
//! storage; here that is a one-row key/value table.

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::Result;
use crate::session::SESSION_STORAGE_KEY;

/// SQLite-backed store for the persisted session id
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open a session store at the given database path
    ///
    /// Parent directories are created if missing.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Create an in-memory session store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_tables()?;
        Ok(store)
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS session_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Read the persisted session id, if any
    pub fn get(&self) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT value FROM session_kv WHERE key = ?1",
            params![SESSION_STORAGE_KEY],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist a session id, overwriting any stored value
    pub fn put(&self, session_id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session_kv (key, value, updated_at)
             VALUES (?1, ?2, ?3)",
            params![SESSION_STORAGE_KEY, session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove the persisted session id
    pub fn clear(&self) -> Result<()> {
        self.conn.execute(
            "DELETE FROM session_kv WHERE key = ?1",
            params![SESSION_STORAGE_KEY],
        )?;
        Ok(())
    }
}
