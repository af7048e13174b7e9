//! SQLite-backed key/value substrate.
//!
//! # Invariants
//! - Connections are opened through `db::open_db*`, so migrations always run first.
//! - Prefix scans never match keys outside the requested prefix, including
//!   keys containing SQL `LIKE` wildcards.

use super::{KvBackend, KvResult};
use crate::db::{open_db, open_db_in_memory};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct SqliteKvBackend {
    conn: Mutex<Connection>,
}

impl SqliteKvBackend {
    pub fn open(path: impl AsRef<Path>) -> KvResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> KvResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already-migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

impl KvBackend for SqliteKvBackend {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        let conn = crate::sync::lock(&self.conn);
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> KvResult<()> {
        let conn = crate::sync::lock(&self.conn);
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at;",
            params![key, value, now_epoch_ms()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<bool> {
        let conn = crate::sync::lock(&self.conn);
        let changed = conn.execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(changed > 0)
    }

    fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let conn = crate::sync::lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT key FROM kv_entries
             WHERE substr(key, 1, length(?1)) = ?1
             ORDER BY key ASC;",
        )?;
        let keys = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
