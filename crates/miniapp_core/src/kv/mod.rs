//! Durable key/value substrate contracts.
//!
//! # Responsibility
//! - Define the flat string key/value store the host provides to the kernel.
//! - Provide an in-memory implementation for tests and ephemeral hosts.
//!
//! # Invariants
//! - Single-key writes are atomic: a failed `put` leaves the previous value.
//! - `keys_with_prefix` returns keys in ascending lexical order.

use crate::db::DbError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

mod sqlite;

pub use sqlite::SqliteKvBackend;

pub type KvResult<T> = Result<T, KvError>;

/// Substrate-level failures.
#[derive(Debug)]
pub enum KvError {
    Db(DbError),
    Unavailable(String),
}

impl Display for KvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Unavailable(message) => write!(f, "key/value store unavailable: {message}"),
        }
    }
}

impl Error for KvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) => None,
        }
    }
}

impl From<DbError> for KvError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for KvError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Host-provided durable key/value store.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> KvResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> KvResult<()>;
    /// Returns whether a value was removed.
    fn delete(&self, key: &str) -> KvResult<bool>;
    fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>>;
}

/// Process-local backend; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryKvBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        crate::sync::lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvBackend for MemoryKvBackend {
    fn get(&self, key: &str) -> KvResult<Option<String>> {
        Ok(crate::sync::lock(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> KvResult<()> {
        crate::sync::lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<bool> {
        Ok(crate::sync::lock(&self.entries).remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        let entries = crate::sync::lock(&self.entries);
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
