//! In-process catalog of mini-app manifests.
//!
//! # Responsibility
//! - Hold validated manifests keyed by app id.
//! - Answer catalog queries (lookup, filtered search, per-category counts).
//! - Merge remote catalog records without disturbing native registrations.
//!
//! # Invariants
//! - `id` is unique; re-registering overwrites (last writer wins) and warns.
//! - Remote records never replace a native manifest.
//! - Queries never wait for a remote merge; they see whatever is registered.

use crate::manifest::{AppManifest, AppStatus, ManifestValidationError};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Where a manifest registration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    /// Shipped with the host and registered at boot.
    Native,
    /// Fetched from the remote app-store catalog.
    Remote,
}

/// Registered manifest snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredManifest {
    pub manifest: AppManifest,
    pub source: ManifestSource,
}

impl RegisteredManifest {
    pub fn is_native(&self) -> bool {
        self.source == ManifestSource::Native
    }
}

/// Search filters. Every `Some` field must match (logical AND).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestQuery {
    pub category: Option<String>,
    pub status: Option<AppStatus>,
    pub native: Option<bool>,
    pub installed: Option<bool>,
    /// Case-insensitive substring over name, description and tags.
    pub text: Option<String>,
}

#[derive(Debug, Default)]
pub struct ManifestRegistry {
    entries: BTreeMap<String, RegisteredManifest>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one manifest after declaration validation.
    ///
    /// Returns the previous registration under the same id, if any.
    pub fn register(
        &mut self,
        manifest: AppManifest,
        source: ManifestSource,
    ) -> Result<Option<RegisteredManifest>, RegistryError> {
        manifest
            .validate()
            .map_err(RegistryError::InvalidManifest)?;

        let id = manifest.id.clone();
        let previous = self
            .entries
            .insert(id.clone(), RegisteredManifest { manifest, source });
        if previous.is_some() {
            warn!(
                "event=manifest_register module=registry status=overwritten app_id={}",
                id
            );
        }
        Ok(previous)
    }

    pub fn unregister(&mut self, app_id: &str) -> Option<RegisteredManifest> {
        self.entries.remove(app_id)
    }

    pub fn get(&self, app_id: &str) -> Option<&RegisteredManifest> {
        self.entries.get(app_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &RegisteredManifest> {
        self.entries.values()
    }

    /// Filters manifests. `is_installed` answers the `installed` filter.
    pub fn search(
        &self,
        query: &ManifestQuery,
        is_installed: &dyn Fn(&str) -> bool,
    ) -> Vec<&RegisteredManifest> {
        let needle = query
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase);

        self.entries
            .values()
            .filter(|entry| {
                let manifest = &entry.manifest;
                if let Some(category) = &query.category {
                    if &manifest.category != category {
                        return false;
                    }
                }
                if let Some(status) = query.status {
                    if manifest.status != status {
                        return false;
                    }
                }
                if let Some(native) = query.native {
                    if entry.is_native() != native {
                        return false;
                    }
                }
                if let Some(installed) = query.installed {
                    if is_installed(&manifest.id) != installed {
                        return false;
                    }
                }
                match &needle {
                    Some(needle) => matches_text(manifest, needle),
                    None => true,
                }
            })
            .collect()
    }

    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.entries.values() {
            *counts.entry(entry.manifest.category.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Merges raw remote catalog records and returns how many were merged.
    ///
    /// Records that fail to parse or validate are skipped.
    pub fn merge_remote(&mut self, records: Vec<Value>) -> usize {
        let total = records.len();
        let mut merged = 0;
        for record in records {
            let manifest = match serde_json::from_value::<AppManifest>(record) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(
                        "event=catalog_merge module=registry status=skipped reason=parse error={}",
                        err
                    );
                    continue;
                }
            };
            if self.get(&manifest.id).is_some_and(RegisteredManifest::is_native) {
                continue;
            }
            let id = manifest.id.clone();
            match self.register(manifest, ManifestSource::Remote) {
                Ok(_) => merged += 1,
                Err(err) => warn!(
                    "event=catalog_merge module=registry status=skipped app_id={} error={}",
                    id, err
                ),
            }
        }
        info!(
            "event=catalog_merge module=registry status=ok received={} merged={}",
            total, merged
        );
        merged
    }
}

fn matches_text(manifest: &AppManifest, needle: &str) -> bool {
    manifest.name.to_lowercase().contains(needle)
        || manifest.description.to_lowercase().contains(needle)
        || manifest
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

/// Registry registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidManifest(ManifestValidationError),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidManifest(err) => write!(f, "invalid app manifest: {err}"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidManifest(err) => Some(err),
        }
    }
}
