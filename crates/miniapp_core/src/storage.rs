//! Per-app isolated key/value storage.
//!
//! # Responsibility
//! - Give every mini-app a private namespace `<namespace>:<appId>:<key>`.
//! - Enforce key validity and per-app quotas before any write.
//!
//! # Invariants
//! - An operation only ever touches keys under the calling app's prefix.
//! - A rejected `set` leaves storage unchanged.
//! - `get` never fails on legacy non-JSON values; they come back as strings.

use crate::config::KernelConfig;
use crate::kv::{KvBackend, KvError};
use crate::sync::lock;
use log::debug;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

/// Storage limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLimits {
    pub max_key_length: usize,
    pub max_value_size: usize,
    pub max_keys_per_app: usize,
}

impl From<&KernelConfig> for StorageLimits {
    fn from(config: &KernelConfig) -> Self {
        Self {
            max_key_length: config.max_key_length,
            max_value_size: config.max_value_size,
            max_keys_per_app: config.max_keys_per_app,
        }
    }
}

/// Storage operation failures.
#[derive(Debug)]
pub enum StorageError {
    InvalidAppId(String),
    EmptyKey,
    KeyTooLong { length: usize, max: usize },
    ForbiddenKey(String),
    Serialize(String),
    ValueTooLarge { size: usize, max: usize },
    TooManyKeys { max: usize },
    Backend(KvError),
}

impl StorageError {
    /// Whether the failure is a quota breach rather than bad input.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::ValueTooLarge { .. } | Self::TooManyKeys { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidAppId(_)
                | Self::EmptyKey
                | Self::KeyTooLong { .. }
                | Self::ForbiddenKey(_)
                | Self::Serialize(_)
        )
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAppId(value) => write!(f, "invalid app id for storage: {value}"),
            Self::EmptyKey => write!(f, "storage key must not be empty"),
            Self::KeyTooLong { length, max } => {
                write!(f, "storage key is {length} characters; maximum is {max}")
            }
            Self::ForbiddenKey(key) => write!(f, "storage key contains forbidden characters: {key}"),
            Self::Serialize(message) => write!(f, "storage value is not serializable: {message}"),
            Self::ValueTooLarge { size, max } => {
                write!(f, "storage value is {size} bytes; maximum is {max}")
            }
            Self::TooManyKeys { max } => write!(f, "app storage is limited to {max} keys"),
            Self::Backend(err) => write!(f, "storage backend failure: {err}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<KvError> for StorageError {
    fn from(value: KvError) -> Self {
        Self::Backend(value)
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Isolated per-app storage over a shared key/value backend.
pub struct AppStorage {
    backend: Arc<dyn KvBackend>,
    namespace: String,
    limits: StorageLimits,
    // Serializes quota check and write so concurrent sets cannot overshoot.
    write_lock: Mutex<()>,
}

impl AppStorage {
    pub fn new(
        backend: Arc<dyn KvBackend>,
        namespace: impl Into<String>,
        limits: StorageLimits,
    ) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
            limits,
            write_lock: Mutex::new(()),
        }
    }

    pub fn limits(&self) -> StorageLimits {
        self.limits
    }

    pub fn get(&self, app_id: &str, key: &str) -> StorageResult<Option<Value>> {
        let full_key = self.full_key(app_id, key)?;
        let Some(raw) = self.backend.get(&full_key)? else {
            return Ok(None);
        };
        Ok(Some(
            serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        ))
    }

    pub fn set(&self, app_id: &str, key: &str, value: &Value) -> StorageResult<()> {
        let full_key = self.full_key(app_id, key)?;
        let serialized =
            serde_json::to_string(value).map_err(|err| StorageError::Serialize(err.to_string()))?;
        if serialized.len() > self.limits.max_value_size {
            return Err(StorageError::ValueTooLarge {
                size: serialized.len(),
                max: self.limits.max_value_size,
            });
        }

        let _guard = lock(&self.write_lock);
        if self.backend.get(&full_key)?.is_none() {
            let existing = self.backend.keys_with_prefix(&self.app_prefix(app_id))?.len();
            if existing >= self.limits.max_keys_per_app {
                return Err(StorageError::TooManyKeys {
                    max: self.limits.max_keys_per_app,
                });
            }
        }
        self.backend.put(&full_key, &serialized)?;
        debug!(
            "event=storage_set module=storage status=ok app_id={} bytes={}",
            app_id,
            serialized.len()
        );
        Ok(())
    }

    /// Removes one key. Returns whether it existed.
    pub fn remove(&self, app_id: &str, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(app_id, key)?;
        let _guard = lock(&self.write_lock);
        Ok(self.backend.delete(&full_key)?)
    }

    /// Removes every key of `app_id` and returns how many were removed.
    pub fn clear(&self, app_id: &str) -> StorageResult<usize> {
        validate_app_id(app_id)?;
        let _guard = lock(&self.write_lock);
        let mut removed = 0;
        for full_key in self.backend.keys_with_prefix(&self.app_prefix(app_id))? {
            if self.backend.delete(&full_key)? {
                removed += 1;
            }
        }
        debug!(
            "event=storage_clear module=storage status=ok app_id={} removed={}",
            app_id, removed
        );
        Ok(removed)
    }

    /// Lists the app's keys without the namespace prefix.
    pub fn keys(&self, app_id: &str) -> StorageResult<Vec<String>> {
        validate_app_id(app_id)?;
        let prefix = self.app_prefix(app_id);
        Ok(self
            .backend
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|full_key| full_key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    fn app_prefix(&self, app_id: &str) -> String {
        format!("{}:{}:", self.namespace, app_id)
    }

    fn full_key(&self, app_id: &str, key: &str) -> StorageResult<String> {
        validate_app_id(app_id)?;
        self.validate_key(key)?;
        Ok(format!("{}{}", self.app_prefix(app_id), key))
    }

    fn validate_key(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        let length = key.chars().count();
        if length > self.limits.max_key_length {
            return Err(StorageError::KeyTooLong {
                length,
                max: self.limits.max_key_length,
            });
        }
        if key.contains("..")
            || key.contains('/')
            || key.contains('\\')
            || key.chars().any(char::is_control)
        {
            return Err(StorageError::ForbiddenKey(key.to_string()));
        }
        Ok(())
    }
}

fn validate_app_id(app_id: &str) -> StorageResult<()> {
    if app_id.is_empty() || app_id.contains(':') || app_id.chars().any(char::is_control) {
        return Err(StorageError::InvalidAppId(app_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AppStorage, StorageError, StorageLimits};
    use crate::kv::{KvBackend, MemoryKvBackend};
    use serde_json::json;
    use std::sync::Arc;

    fn storage(limits: StorageLimits) -> (Arc<MemoryKvBackend>, AppStorage) {
        let backend = Arc::new(MemoryKvBackend::new());
        let storage = AppStorage::new(backend.clone(), "ns", limits);
        (backend, storage)
    }

    fn default_limits() -> StorageLimits {
        StorageLimits {
            max_key_length: 256,
            max_value_size: 1024 * 1024,
            max_keys_per_app: 1000,
        }
    }

    #[test]
    fn structured_values_round_trip() {
        let (_, storage) = storage(default_limits());
        let value = json!({"n": 5, "tags": ["a", "b"], "nested": {"ok": true}});
        storage.set("demo", "profile", &value).expect("set");
        assert_eq!(storage.get("demo", "profile").expect("get"), Some(value));
        assert!(storage.remove("demo", "profile").expect("remove"));
        assert_eq!(storage.get("demo", "profile").expect("get after remove"), None);
    }

    #[test]
    fn legacy_raw_values_are_returned_as_strings() {
        let (backend, storage) = storage(default_limits());
        backend.put("ns:demo:legacy", "not-json{").expect("seed raw");
        assert_eq!(
            storage.get("demo", "legacy").expect("raw read"),
            Some(json!("not-json{"))
        );
    }

    #[test]
    fn apps_are_isolated() {
        let (backend, storage) = storage(default_limits());
        storage.set("a", "k", &json!(1)).expect("set a");
        storage.set("ab", "k", &json!(2)).expect("set ab");
        assert_eq!(storage.keys("a").expect("keys"), vec!["k"]);
        assert_eq!(storage.clear("a").expect("clear"), 1);
        assert_eq!(storage.get("ab", "k").expect("get ab"), Some(json!(2)));
        assert!(backend.get("ns:ab:k").expect("kv get").is_some());
    }

    #[test]
    fn rejects_bad_keys_and_app_ids() {
        let (_, storage) = storage(default_limits());
        for key in ["", "../etc", "a/b", "a\\b", "tab\tkey"] {
            let err = storage.set("demo", key, &json!(1)).expect_err("bad key");
            assert!(err.is_validation(), "key {key:?} gave {err}");
        }
        let long = "k".repeat(257);
        assert!(matches!(
            storage.set("demo", &long, &json!(1)),
            Err(StorageError::KeyTooLong { length: 257, max: 256 })
        ));
        assert!(matches!(
            storage.get("de:mo", "k"),
            Err(StorageError::InvalidAppId(_))
        ));
    }

    #[test]
    fn oversized_value_leaves_store_untouched() {
        let (backend, storage) = storage(StorageLimits {
            max_value_size: 16,
            ..default_limits()
        });
        storage.set("demo", "k", &json!("small")).expect("small set");
        let err = storage
            .set("demo", "k", &json!("this string is too large"))
            .expect_err("oversized value");
        assert!(err.is_quota());
        assert_eq!(storage.get("demo", "k").expect("get"), Some(json!("small")));
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn key_count_quota_allows_overwrites() {
        let (_, storage) = storage(StorageLimits {
            max_keys_per_app: 2,
            ..default_limits()
        });
        storage.set("demo", "a", &json!(1)).expect("a");
        storage.set("demo", "b", &json!(2)).expect("b");
        let err = storage.set("demo", "c", &json!(3)).expect_err("third key");
        assert!(matches!(err, StorageError::TooManyKeys { max: 2 }));
        storage.set("demo", "a", &json!(10)).expect("overwrite");
        storage.set("other", "c", &json!(3)).expect("other app has its own quota");
        assert_eq!(storage.keys("demo").expect("keys"), vec!["a", "b"]);
    }
}
