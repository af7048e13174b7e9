//! Mini-app manifest declaration and validation.
//!
//! # Responsibility
//! - Describe an installable mini-app: identity, presentation, launch mode and
//!   requested permissions.
//! - Reject declarations the kernel cannot safely host.
//!
//! # See also
//! - [`registry`] for the in-process catalog of validated manifests.

pub mod registry;
pub mod remote;

use crate::permission;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// How the host presents a mini-app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Internal,
    Sandboxed,
    External,
}

/// How an external mini-app authenticates the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    #[default]
    None,
    Session,
    DerivedToken,
    Oauth,
}

/// Publication status shown in catalog UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppStatus {
    #[default]
    Stable,
    Beta,
    Alpha,
    ComingSoon,
    Deprecated,
    /// Installed but refused at the bridge until reinstated.
    Suspended,
}

/// One permission requested by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPermission {
    pub id: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Declarative mini-app manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    /// Globally unique id, e.g. `wallet` or `acme.loyalty-club`.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Semantic version string (`major.minor.patch`).
    pub version: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<ManifestPermission>,
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub entry_point: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub status: AppStatus,
}

impl AppManifest {
    /// Validates declaration-level manifest invariants.
    ///
    /// A missing `externalUrl` is not a declaration error; the launcher
    /// reports it when the app is opened.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if self.id.trim().is_empty() {
            return Err(ManifestValidationError::EmptyId);
        }
        if !is_valid_app_id(&self.id) {
            return Err(ManifestValidationError::InvalidId(self.id.clone()));
        }
        if self.name.trim().is_empty() {
            return Err(ManifestValidationError::EmptyName);
        }
        if !is_semver_triplet(self.version.trim()) {
            return Err(ManifestValidationError::InvalidVersion(
                self.version.clone(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(ManifestValidationError::EmptyCategory);
        }

        let mut dedup = BTreeSet::<&str>::new();
        for requested in &self.permissions {
            let id = requested.id.as_str();
            if permission::get(id).is_err() {
                return Err(ManifestValidationError::UnknownPermission(id.to_string()));
            }
            if !dedup.insert(id) {
                return Err(ManifestValidationError::DuplicatePermission(id.to_string()));
            }
        }

        if self.launch_mode == LaunchMode::Internal && self.entry_point.trim().is_empty() {
            return Err(ManifestValidationError::MissingEntryPoint);
        }
        if let Some(raw) = &self.external_url {
            match url::Url::parse(raw) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => return Err(ManifestValidationError::InvalidExternalUrl(raw.clone())),
            }
        }
        Ok(())
    }

    /// Permission ids the app cannot run without.
    pub fn required_permission_ids(&self) -> impl Iterator<Item = &str> {
        self.permissions
            .iter()
            .filter(|requested| !requested.optional)
            .map(|requested| requested.id.as_str())
    }
}

fn is_valid_app_id(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
            continue;
        }
        if matches!(c, '.' | '_' | '-') {
            if prev_separator {
                return false;
            }
            prev_separator = true;
            continue;
        }
        return false;
    }
    !prev_separator
}

fn is_semver_triplet(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

/// Manifest declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestValidationError {
    EmptyId,
    InvalidId(String),
    EmptyName,
    InvalidVersion(String),
    EmptyCategory,
    UnknownPermission(String),
    DuplicatePermission(String),
    MissingEntryPoint,
    InvalidExternalUrl(String),
}

impl Display for ManifestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "manifest id must not be empty"),
            Self::InvalidId(value) => write!(f, "manifest id is invalid: {value}"),
            Self::EmptyName => write!(f, "manifest name must not be empty"),
            Self::InvalidVersion(value) => write!(
                f,
                "manifest version is invalid: {value} (expected major.minor.patch)"
            ),
            Self::EmptyCategory => write!(f, "manifest category must not be empty"),
            Self::UnknownPermission(value) => {
                write!(f, "manifest requests unknown permission: {value}")
            }
            Self::DuplicatePermission(value) => {
                write!(f, "manifest permission is duplicated: {value}")
            }
            Self::MissingEntryPoint => write!(f, "internal manifest requires an entryPoint"),
            Self::InvalidExternalUrl(value) => {
                write!(f, "manifest externalUrl is not an http(s) URL: {value}")
            }
        }
    }
}

impl Error for ManifestValidationError {}

#[cfg(test)]
pub(crate) mod tests {
    use super::{
        AppManifest, AppStatus, AuthMethod, LaunchMode, ManifestPermission,
        ManifestValidationError,
    };
    use serde_json::json;

    pub(crate) fn manifest(id: &str) -> AppManifest {
        AppManifest {
            id: id.to_string(),
            name: format!("{id} app"),
            description: String::new(),
            version: "1.0.0".to_string(),
            category: "finance".to_string(),
            tags: vec![],
            permissions: vec![ManifestPermission {
                id: "wallet:read".to_string(),
                optional: false,
                reason: None,
            }],
            launch_mode: LaunchMode::Internal,
            entry_point: format!("/app/{id}"),
            external_url: None,
            auth_method: AuthMethod::None,
            status: AppStatus::Stable,
        }
    }

    #[test]
    fn accepts_valid_manifest() {
        manifest("wallet").validate().expect("valid manifest");
    }

    #[test]
    fn deserializes_camel_case_wire_shape() {
        let parsed: AppManifest = serde_json::from_value(json!({
            "id": "acme.shop",
            "name": "Acme Shop",
            "version": "0.3.1",
            "category": "commerce",
            "permissions": [{"id": "storage.app", "optional": true}],
            "launchMode": "external",
            "externalUrl": "https://shop.acme.test",
            "authMethod": "derived-token",
            "status": "coming-soon"
        }))
        .expect("manifest json");

        assert_eq!(parsed.launch_mode, LaunchMode::External);
        assert_eq!(parsed.auth_method, AuthMethod::DerivedToken);
        assert_eq!(parsed.status, AppStatus::ComingSoon);
        assert!(parsed.permissions[0].optional);
        assert_eq!(parsed.required_permission_ids().count(), 0);
        parsed.validate().expect("valid external manifest");
    }

    #[test]
    fn rejects_invalid_ids() {
        for id in ["", "Wallet", "a..b", "bad:id", "trailing-"] {
            let mut candidate = manifest("ok");
            candidate.id = id.to_string();
            assert!(candidate.validate().is_err(), "id `{id}` must be rejected");
        }
    }

    #[test]
    fn rejects_unknown_and_duplicate_permissions() {
        let mut candidate = manifest("wallet");
        candidate.permissions.push(ManifestPermission {
            id: "bluetooth".to_string(),
            optional: true,
            reason: None,
        });
        assert_eq!(
            candidate.validate(),
            Err(ManifestValidationError::UnknownPermission(
                "bluetooth".to_string()
            ))
        );

        let mut candidate = manifest("wallet");
        candidate.permissions.push(candidate.permissions[0].clone());
        assert!(matches!(
            candidate.validate(),
            Err(ManifestValidationError::DuplicatePermission(_))
        ));
    }

    #[test]
    fn rejects_non_http_external_url_and_bad_version() {
        let mut candidate = manifest("wallet");
        candidate.external_url = Some("javascript:alert(1)".to_string());
        assert!(matches!(
            candidate.validate(),
            Err(ManifestValidationError::InvalidExternalUrl(_))
        ));

        let mut candidate = manifest("wallet");
        candidate.version = "1.0".to_string();
        assert!(matches!(
            candidate.validate(),
            Err(ManifestValidationError::InvalidVersion(_))
        ));
    }
}
