//! Versioned grant record migrations.
//!
//! # Responsibility
//! - Bring persisted grant records of any supported older version up to
//!   [`CURRENT_SCHEMA_VERSION`] through an ordered chain of steps.
//!
//! # Invariants
//! - Steps are contiguous: each `to` equals the next step's `from`.
//! - Records newer than the current version are refused, never downgraded.

use super::UserGrantState;
use log::info;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// One record transformation between adjacent schema versions.
pub struct RecordMigration {
    pub from: u32,
    pub to: u32,
    pub apply: fn(Map<String, Value>) -> Map<String, Value>,
}

const MIGRATIONS: &[RecordMigration] = &[RecordMigration {
    from: 1,
    to: 2,
    apply: v1_to_v2,
}];

/// Returns the registered migration chain.
pub fn migrations() -> &'static [RecordMigration] {
    MIGRATIONS
}

/// Grant record load failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    NotAnObject,
    UnsupportedSchemaVersion { found: u32, latest_supported: u32 },
    MissingStep(u32),
    Malformed(String),
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "grant record is not a JSON object"),
            Self::UnsupportedSchemaVersion {
                found,
                latest_supported,
            } => write!(
                f,
                "grant record schema version {found} is newer than supported version {latest_supported}"
            ),
            Self::MissingStep(from) => write!(f, "no grant record migration from version {from}"),
            Self::Malformed(message) => write!(f, "grant record is malformed: {message}"),
        }
    }
}

impl Error for MigrationError {}

/// Parses a persisted record, migrating it to the current version.
pub fn migrate_record(raw: Value) -> Result<UserGrantState, MigrationError> {
    let Value::Object(mut record) = raw else {
        return Err(MigrationError::NotAnObject);
    };

    // Early records wrapped the payload as `{state: {...}, version: n}`.
    if let Some(Value::Object(inner)) = record.remove("state") {
        let outer_version = record.get("version").cloned();
        record = inner;
        if !record.contains_key("version") && !record.contains_key("schemaVersion") {
            if let Some(version) = outer_version {
                record.insert("version".to_string(), version);
            }
        }
    }

    let mut version = record_version(&record);
    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::UnsupportedSchemaVersion {
            found: version,
            latest_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    while version < CURRENT_SCHEMA_VERSION {
        let step = MIGRATIONS
            .iter()
            .find(|step| step.from == version)
            .ok_or(MigrationError::MissingStep(version))?;
        record = (step.apply)(record);
        info!(
            "event=grants_migrate module=grants status=ok from={} to={}",
            step.from, step.to
        );
        version = step.to;
    }

    serde_json::from_value(Value::Object(record))
        .map_err(|err| MigrationError::Malformed(err.to_string()))
}

fn record_version(record: &Map<String, Value>) -> u32 {
    record
        .get("schemaVersion")
        .or_else(|| record.get("version"))
        .and_then(Value::as_u64)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
        .unwrap_or(1)
}

fn v1_to_v2(mut record: Map<String, Value>) -> Map<String, Value> {
    record.remove("version");

    let installed = unique_strings(record.remove("installedApps"));
    let installed_set: HashSet<&str> = installed.iter().map(String::as_str).collect();

    let pinned: Vec<String> = unique_strings(record.remove("pinnedApps"))
        .into_iter()
        .filter(|id| installed_set.contains(id.as_str()))
        .collect();

    let keep_installed = |map: Option<Value>| -> Map<String, Value> {
        match map {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter(|(id, _)| installed_set.contains(id.as_str()))
                .collect(),
            _ => Map::new(),
        }
    };

    let app_order: Map<String, Value> = keep_installed(record.remove("appOrder"))
        .into_iter()
        .filter(|(_, index)| index.is_u64())
        .collect();
    let granted: Map<String, Value> = keep_installed(record.remove("grantedPermissions"))
        .into_iter()
        .map(|(id, permissions)| {
            let permissions = unique_strings(Some(permissions))
                .into_iter()
                .map(Value::String)
                .collect();
            (id, Value::Array(permissions))
        })
        .collect();
    let settings: Map<String, Value> = keep_installed(record.remove("appSettings"))
        .into_iter()
        .filter(|(_, value)| value.is_object())
        .collect();
    // ISO-8601 strings from early builds are dropped; only epoch millis survive.
    let last_used: Map<String, Value> = keep_installed(record.remove("lastUsed"))
        .into_iter()
        .filter(|(_, value)| value.is_u64())
        .collect();

    let mut next = Map::new();
    next.insert(
        "schemaVersion".to_string(),
        Value::from(2_u32),
    );
    next.insert(
        "installedApps".to_string(),
        Value::Array(installed.iter().cloned().map(Value::String).collect()),
    );
    next.insert(
        "pinnedApps".to_string(),
        Value::Array(pinned.into_iter().map(Value::String).collect()),
    );
    next.insert("appOrder".to_string(), Value::Object(app_order));
    next.insert("grantedPermissions".to_string(), Value::Object(granted));
    next.insert("appSettings".to_string(), Value::Object(settings));
    next.insert("lastUsed".to_string(), Value::Object(last_used));
    next
}

fn unique_strings(value: Option<Value>) -> Vec<String> {
    let mut seen = HashSet::new();
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .filter(|text| seen.insert(text.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{migrate_record, migrations, MigrationError, CURRENT_SCHEMA_VERSION};
    use serde_json::json;

    #[test]
    fn chain_is_contiguous_and_ends_at_current() {
        let chain = migrations();
        for pair in chain.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(chain.last().map(|step| step.to), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn v1_record_is_normalized() {
        let state = migrate_record(json!({
            "state": {
                "installedApps": ["wallet", "chat", "wallet", "games"],
                "pinnedApps": ["chat", "ghost"],
                "appOrder": {"chat": 0, "ghost": 1},
                "grantedPermissions": {
                    "wallet": ["wallet:read", "wallet:read"],
                    "ghost": ["storage.app"]
                },
                "appSettings": {"games": {"sound": false}, "ghost": {"x": 1}},
                "lastUsed": {"wallet": "2024-05-01T10:00:00Z", "chat": 1714557600000_u64},
                "version": 1
            },
            "version": 1
        }))
        .expect("v1 record should migrate");

        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.installed_apps, vec!["wallet", "chat", "games"]);
        assert_eq!(state.pinned_apps, vec!["chat"]);
        assert_eq!(state.app_order.len(), 1);
        assert_eq!(state.granted_permissions["wallet"], vec!["wallet:read"]);
        assert!(!state.granted_permissions.contains_key("ghost"));
        assert!(!state.app_settings.contains_key("ghost"));
        assert_eq!(state.last_used.get("chat"), Some(&1_714_557_600_000));
        assert!(!state.last_used.contains_key("wallet"));
    }

    #[test]
    fn current_record_passes_through() {
        let state = migrate_record(json!({
            "schemaVersion": 2,
            "installedApps": ["wallet"],
            "pinnedApps": [],
            "appOrder": {},
            "grantedPermissions": {"wallet": ["wallet:read"]},
            "appSettings": {},
            "lastUsed": {}
        }))
        .expect("current record");
        assert_eq!(state.installed_apps, vec!["wallet"]);
    }

    #[test]
    fn rejects_newer_and_non_object_records() {
        let err = migrate_record(json!({"schemaVersion": 99})).expect_err("newer record");
        assert_eq!(
            err,
            MigrationError::UnsupportedSchemaVersion {
                found: 99,
                latest_supported: CURRENT_SCHEMA_VERSION
            }
        );
        assert_eq!(
            migrate_record(json!([1, 2])).expect_err("array record"),
            MigrationError::NotAnObject
        );
    }

    #[test]
    fn malformed_current_record_is_reported() {
        let err = migrate_record(json!({"schemaVersion": 2, "installedApps": "wallet"}))
            .expect_err("malformed record");
        assert!(matches!(err, MigrationError::Malformed(_)));
    }
}
