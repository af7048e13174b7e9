//! Per-user grant store.
//!
//! # Responsibility
//! - Track installed and pinned apps, ordering, granted permissions, per-app
//!   settings and last-used timestamps for the active user.
//! - Persist the full record after every effective mutation.
//!
//! # Invariants
//! - `pinned_apps` is a subset of `installed_apps`.
//! - Per-app maps only hold keys of installed apps; uninstall cascades.
//! - Durable writes are best-effort: a failed write is logged and the
//!   in-memory state stays authoritative.

pub mod migrate;

use crate::kv::KvBackend;
use crate::permission::{grant_satisfies, Permission};
use crate::protocol::now_ms;
use crate::sync::lock;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

pub use migrate::{migrate_record, MigrationError, CURRENT_SCHEMA_VERSION};

const GUEST_KEY: &str = "guest";

/// Persisted grant record of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserGrantState {
    pub installed_apps: Vec<String>,
    pub pinned_apps: Vec<String>,
    pub app_order: BTreeMap<String, usize>,
    pub granted_permissions: BTreeMap<String, Vec<String>>,
    pub app_settings: BTreeMap<String, BTreeMap<String, Value>>,
    /// Epoch milliseconds.
    pub last_used: BTreeMap<String, u64>,
    pub schema_version: u32,
}

impl Default for UserGrantState {
    fn default() -> Self {
        Self {
            installed_apps: Vec::new(),
            pinned_apps: Vec::new(),
            app_order: BTreeMap::new(),
            granted_permissions: BTreeMap::new(),
            app_settings: BTreeMap::new(),
            last_used: BTreeMap::new(),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }
}

impl UserGrantState {
    /// First-run state with the given pre-installed apps.
    pub fn with_installed(apps: &[String]) -> Self {
        let mut state = Self::default();
        for app_id in apps {
            state.install(app_id, &[]);
        }
        state
    }

    pub fn is_installed(&self, app_id: &str) -> bool {
        self.installed_apps.iter().any(|id| id == app_id)
    }

    pub fn is_pinned(&self, app_id: &str) -> bool {
        self.pinned_apps.iter().any(|id| id == app_id)
    }

    fn install(&mut self, app_id: &str, granted: &[String]) -> bool {
        if self.is_installed(app_id) {
            return false;
        }
        self.installed_apps.push(app_id.to_string());
        let mut seen = HashSet::new();
        let granted = granted
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        self.granted_permissions.insert(app_id.to_string(), granted);
        true
    }

    fn uninstall(&mut self, app_id: &str) -> bool {
        if !self.is_installed(app_id) {
            return false;
        }
        self.installed_apps.retain(|id| id != app_id);
        self.pinned_apps.retain(|id| id != app_id);
        self.granted_permissions.remove(app_id);
        self.app_settings.remove(app_id);
        self.last_used.remove(app_id);
        self.app_order.remove(app_id);
        true
    }

    /// Installed apps: pinned first, then by explicit order, then insertion.
    pub fn ordered_apps(&self) -> Vec<String> {
        let mut apps: Vec<&String> = self.installed_apps.iter().collect();
        apps.sort_by_key(|id| {
            (
                !self.is_pinned(id),
                self.app_order.get(id.as_str()).copied().unwrap_or(usize::MAX),
            )
        });
        apps.into_iter().cloned().collect()
    }

    pub fn has_permission(&self, app_id: &str, required: Permission) -> bool {
        self.granted_permissions
            .get(app_id)
            .is_some_and(|granted| granted.iter().any(|id| grant_satisfies(id, required)))
    }
}

/// Grant store failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantStoreError {
    UnsupportedSchemaVersion { user: String, found: u32, latest_supported: u32 },
}

impl Display for GrantStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSchemaVersion {
                user,
                found,
                latest_supported,
            } => write!(
                f,
                "grant record for `{user}` has schema version {found}; this build supports up to {latest_supported}"
            ),
        }
    }
}

impl Error for GrantStoreError {}

struct ActiveRecord {
    user: Option<String>,
    state: UserGrantState,
}

/// Durable, per-user grant store.
pub struct GrantStore {
    backend: Arc<dyn KvBackend>,
    namespace: String,
    default_installed: Vec<String>,
    active: Mutex<ActiveRecord>,
}

impl GrantStore {
    /// Loads the record of `user` (`None` is the guest record).
    pub fn load(
        backend: Arc<dyn KvBackend>,
        namespace: impl Into<String>,
        default_installed: Vec<String>,
        user: Option<String>,
    ) -> Result<Self, GrantStoreError> {
        let namespace = namespace.into();
        let state = read_record(backend.as_ref(), &namespace, &default_installed, user.as_deref())?;
        Ok(Self {
            backend,
            namespace,
            default_installed,
            active: Mutex::new(ActiveRecord { user, state }),
        })
    }

    pub fn current_user(&self) -> Option<String> {
        lock(&self.active).user.clone()
    }

    pub fn snapshot(&self) -> UserGrantState {
        lock(&self.active).state.clone()
    }

    /// Saves the active record, then loads the record of `user`.
    ///
    /// On error the active user is unchanged.
    pub fn switch_user(&self, user: Option<String>) -> Result<(), GrantStoreError> {
        let mut active = lock(&self.active);
        self.persist(active.user.as_deref(), &active.state);
        let state = read_record(
            self.backend.as_ref(),
            &self.namespace,
            &self.default_installed,
            user.as_deref(),
        )?;
        info!(
            "event=grants_switch_user module=grants status=ok user={}",
            user_label(user.as_deref())
        );
        *active = ActiveRecord { user, state };
        Ok(())
    }

    /// Installs an app with its initial grants. No-op when already installed.
    pub fn install_app(&self, app_id: &str, granted: &[String]) -> bool {
        self.mutate("install_app", app_id, |state| state.install(app_id, granted))
    }

    /// Uninstalls an app and cascades every per-app entry.
    pub fn uninstall_app(&self, app_id: &str) -> bool {
        self.mutate("uninstall_app", app_id, |state| state.uninstall(app_id))
    }

    /// Pins an installed app. Unknown apps are ignored.
    pub fn pin_app(&self, app_id: &str) -> bool {
        self.mutate("pin_app", app_id, |state| {
            if !state.is_installed(app_id) || state.is_pinned(app_id) {
                return false;
            }
            state.pinned_apps.push(app_id.to_string());
            true
        })
    }

    pub fn unpin_app(&self, app_id: &str) -> bool {
        self.mutate("unpin_app", app_id, |state| {
            let before = state.pinned_apps.len();
            state.pinned_apps.retain(|id| id != app_id);
            state.pinned_apps.len() != before
        })
    }

    /// Rebuilds the explicit order from `ordered_ids` positions.
    ///
    /// Ids that are not installed are skipped; their position still counts.
    pub fn reorder_apps(&self, ordered_ids: &[String]) {
        self.mutate("reorder_apps", "*", |state| {
            let mut order = BTreeMap::new();
            for (index, app_id) in ordered_ids.iter().enumerate() {
                if state.is_installed(app_id) {
                    order.entry(app_id.clone()).or_insert(index);
                }
            }
            let changed = order != state.app_order;
            state.app_order = order;
            changed
        });
    }

    /// Grants one permission id to an installed app.
    ///
    /// Ids are not checked against the app manifest.
    pub fn grant_permission(&self, app_id: &str, permission_id: &str) -> bool {
        self.mutate("grant_permission", app_id, |state| {
            if !state.is_installed(app_id) {
                return false;
            }
            let granted = state
                .granted_permissions
                .entry(app_id.to_string())
                .or_default();
            if granted.iter().any(|id| id == permission_id) {
                return false;
            }
            granted.push(permission_id.to_string());
            true
        })
    }

    pub fn revoke_permission(&self, app_id: &str, permission_id: &str) -> bool {
        self.mutate("revoke_permission", app_id, |state| {
            let Some(granted) = state.granted_permissions.get_mut(app_id) else {
                return false;
            };
            let before = granted.len();
            granted.retain(|id| id != permission_id);
            granted.len() != before
        })
    }

    pub fn set_app_setting(&self, app_id: &str, key: &str, value: Value) -> bool {
        self.mutate("set_app_setting", app_id, |state| {
            if !state.is_installed(app_id) {
                return false;
            }
            let settings = state.app_settings.entry(app_id.to_string()).or_default();
            settings.insert(key.to_string(), value);
            true
        })
    }

    pub fn get_app_setting(&self, app_id: &str, key: &str) -> Option<Value> {
        lock(&self.active)
            .state
            .app_settings
            .get(app_id)
            .and_then(|settings| settings.get(key))
            .cloned()
    }

    pub fn record_app_usage(&self, app_id: &str) -> bool {
        let now = now_ms();
        self.mutate("record_app_usage", app_id, |state| {
            if !state.is_installed(app_id) {
                return false;
            }
            state.last_used.insert(app_id.to_string(), now);
            true
        })
    }

    /// Restores the first-run record for the active user.
    pub fn reset_preferences(&self) {
        let defaults = UserGrantState::with_installed(&self.default_installed);
        self.mutate("reset_preferences", "*", |state| {
            *state = defaults;
            true
        });
    }

    pub fn is_installed(&self, app_id: &str) -> bool {
        lock(&self.active).state.is_installed(app_id)
    }

    pub fn is_pinned(&self, app_id: &str) -> bool {
        lock(&self.active).state.is_pinned(app_id)
    }

    /// Whether any grant of `app_id` satisfies `required`.
    pub fn has_permission(&self, app_id: &str, required: Permission) -> bool {
        lock(&self.active).state.has_permission(app_id, required)
    }

    pub fn get_app_permissions(&self, app_id: &str) -> Vec<String> {
        lock(&self.active)
            .state
            .granted_permissions
            .get(app_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ordered_apps(&self) -> Vec<String> {
        lock(&self.active).state.ordered_apps()
    }

    fn mutate(
        &self,
        action: &'static str,
        app_id: &str,
        apply: impl FnOnce(&mut UserGrantState) -> bool,
    ) -> bool {
        let mut active = lock(&self.active);
        let changed = apply(&mut active.state);
        if changed {
            self.persist(active.user.as_deref(), &active.state);
        }
        debug!(
            "event=grants_mutate module=grants status=ok action={} app_id={} changed={}",
            action, app_id, changed
        );
        changed
    }

    fn persist(&self, user: Option<&str>, state: &UserGrantState) {
        let key = record_key(&self.namespace, user);
        let result = serde_json::to_string(state)
            .map_err(|err| err.to_string())
            .and_then(|raw| self.backend.put(&key, &raw).map_err(|err| err.to_string()));
        if let Err(err) = result {
            warn!(
                "event=grants_persist module=grants status=error user={} error={}",
                user_label(user),
                err
            );
        }
    }
}

fn read_record(
    backend: &dyn KvBackend,
    namespace: &str,
    default_installed: &[String],
    user: Option<&str>,
) -> Result<UserGrantState, GrantStoreError> {
    let key = record_key(namespace, user);
    let raw = match backend.get(&key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Ok(UserGrantState::with_installed(default_installed)),
        Err(err) => {
            error!(
                "event=grants_load module=grants status=error user={} error={}",
                user_label(user),
                err
            );
            return Ok(UserGrantState::with_installed(default_installed));
        }
    };

    let parsed = serde_json::from_str::<Value>(&raw)
        .map_err(|err| MigrationError::Malformed(err.to_string()))
        .and_then(migrate_record);
    match parsed {
        Ok(state) => Ok(state),
        Err(MigrationError::UnsupportedSchemaVersion {
            found,
            latest_supported,
        }) => Err(GrantStoreError::UnsupportedSchemaVersion {
            user: user_label(user).to_string(),
            found,
            latest_supported,
        }),
        Err(err) => {
            error!(
                "event=grants_load module=grants status=fallback user={} error={}",
                user_label(user),
                err
            );
            Ok(UserGrantState::with_installed(default_installed))
        }
    }
}

fn record_key(namespace: &str, user: Option<&str>) -> String {
    format!("{namespace}:{}", user_label(user))
}

fn user_label(user: Option<&str>) -> &str {
    user.unwrap_or(GUEST_KEY)
}
