//! Static permission catalog.
//!
//! # Responsibility
//! - Declare every permission a mini-app can be granted, with its risk tier and
//!   whether each use needs an interactive confirmation.
//! - Resolve legacy dotted permission ids onto canonical `resource:action` ids.
//!
//! # Invariants
//! - The catalog is immutable and never persisted.
//! - Every [`Permission`] variant has exactly one catalog definition.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Canonical permission required by capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    AuthRead,
    AuthWrite,
    WalletRead,
    WalletTransfer,
    StorageRead,
    StorageWrite,
    UiToast,
    UiModal,
    EventsSubscribe,
    EventsEmit,
    LocationRead,
    LocationGeocode,
    MapsDisplay,
    MapsDirections,
    ContractsRead,
    ContractsWrite,
    ContractsDeploy,
    ContractsExecute,
    CameraAccess,
}

impl Permission {
    pub const ALL: [Permission; 19] = [
        Self::AuthRead,
        Self::AuthWrite,
        Self::WalletRead,
        Self::WalletTransfer,
        Self::StorageRead,
        Self::StorageWrite,
        Self::UiToast,
        Self::UiModal,
        Self::EventsSubscribe,
        Self::EventsEmit,
        Self::LocationRead,
        Self::LocationGeocode,
        Self::MapsDisplay,
        Self::MapsDirections,
        Self::ContractsRead,
        Self::ContractsWrite,
        Self::ContractsDeploy,
        Self::ContractsExecute,
        Self::CameraAccess,
    ];

    /// Stable id stored in grant records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthRead => "auth:read",
            Self::AuthWrite => "auth:write",
            Self::WalletRead => "wallet:read",
            Self::WalletTransfer => "wallet:transfer",
            Self::StorageRead => "storage:read",
            Self::StorageWrite => "storage:write",
            Self::UiToast => "ui:toast",
            Self::UiModal => "ui:modal",
            Self::EventsSubscribe => "events:subscribe",
            Self::EventsEmit => "events:emit",
            Self::LocationRead => "location:read",
            Self::LocationGeocode => "location:geocode",
            Self::MapsDisplay => "maps:display",
            Self::MapsDirections => "maps:directions",
            Self::ContractsRead => "contracts:read",
            Self::ContractsWrite => "contracts:write",
            Self::ContractsDeploy => "contracts:deploy",
            Self::ContractsExecute => "contracts:execute",
            Self::CameraAccess => "camera:access",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
    }

    pub fn definition(self) -> &'static PermissionDefinition {
        &CANONICAL[self as usize]
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tier shown to users when granting a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub risk: RiskTier,
    pub requires_confirmation: bool,
}

const fn def(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    risk: RiskTier,
    requires_confirmation: bool,
) -> PermissionDefinition {
    PermissionDefinition {
        id,
        name,
        description,
        risk,
        requires_confirmation,
    }
}

// Indexed by `Permission` discriminant; order must follow `Permission::ALL`.
static CANONICAL: [PermissionDefinition; Permission::ALL.len()] = [
    def("auth:read", "Read profile", "See your name, avatar and handle", RiskTier::Low, false),
    def("auth:write", "Edit profile", "Change your profile information", RiskTier::Medium, false),
    def("wallet:read", "View wallet", "Read balances and transaction history", RiskTier::Low, false),
    def("wallet:transfer", "Request transfer", "Ask for approval to transfer tokens", RiskTier::High, true),
    def("storage:read", "Read data", "Read data saved by the app", RiskTier::Low, false),
    def("storage:write", "Save data", "Persist app data on this device", RiskTier::Low, false),
    def("ui:toast", "Notifications", "Show short-lived messages", RiskTier::Low, false),
    def("ui:modal", "Dialogs", "Show dialogs and confirmations", RiskTier::Low, false),
    def("events:subscribe", "Listen to events", "Receive platform events", RiskTier::Low, false),
    def("events:emit", "Emit events", "Send events to the platform", RiskTier::Low, false),
    def("location:read", "Location", "Access your GPS location", RiskTier::Medium, false),
    def("location:geocode", "Geocoding", "Convert addresses into coordinates", RiskTier::Low, false),
    def("maps:display", "Show maps", "Display interactive maps", RiskTier::Low, false),
    def("maps:directions", "Directions", "Compute and display routes", RiskTier::Low, false),
    def("contracts:read", "Read chain", "Query on-chain data", RiskTier::Low, false),
    def("contracts:write", "Write chain", "Submit on-chain transactions", RiskTier::High, true),
    def("contracts:deploy", "Deploy contracts", "Deploy smart contracts", RiskTier::Critical, true),
    def("contracts:execute", "Execute contracts", "Call smart contract methods", RiskTier::High, true),
    def("camera:access", "Camera", "Access the device camera", RiskTier::Medium, false),
];

// Dotted ids still found in published manifests.
static LEGACY: &[PermissionDefinition] = &[
    def("user.profile.read", "Read profile", "See your name, avatar and handle", RiskTier::Low, false),
    def("user.profile.write", "Edit profile", "Change your profile information", RiskTier::Medium, false),
    def("wallet.balance.read", "View balance", "Read token balances", RiskTier::Low, false),
    def("wallet.history.read", "View history", "Read transaction history", RiskTier::Medium, false),
    def("wallet.transfer.request", "Request transfer", "Ask for approval to transfer tokens", RiskTier::High, true),
    def("storage.app", "App storage", "Save app data on this device", RiskTier::Low, false),
    def("notifications.send", "Notifications", "Send notifications", RiskTier::Low, false),
    def("blockchain.read", "Read chain", "Query on-chain data", RiskTier::Low, false),
    def("blockchain.sign", "Sign transactions", "Request transaction signatures", RiskTier::Critical, true),
    def("location", "Location", "Access your GPS location", RiskTier::Medium, false),
    def("camera", "Camera", "Access the device camera", RiskTier::Medium, false),
];

const LEGACY_ALIASES: &[(&str, &[Permission])] = &[
    ("user.profile.read", &[Permission::AuthRead]),
    ("user.profile.write", &[Permission::AuthWrite]),
    ("wallet.balance.read", &[Permission::WalletRead]),
    ("wallet.history.read", &[Permission::WalletRead]),
    ("wallet.transfer.request", &[Permission::WalletTransfer]),
    ("storage.app", &[Permission::StorageRead, Permission::StorageWrite]),
    ("notifications.send", &[Permission::UiToast]),
    ("blockchain.read", &[Permission::ContractsRead]),
    ("blockchain.sign", &[Permission::ContractsExecute]),
    ("location", &[Permission::LocationRead]),
    ("camera", &[Permission::CameraAccess]),
];

/// Lookup failure for an id absent from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPermission(pub String);

impl Display for UnknownPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "permission is not in the catalog: {}", self.0)
    }
}

impl Error for UnknownPermission {}

/// Returns the catalog definition for a canonical or legacy id.
pub fn get(id: &str) -> Result<&'static PermissionDefinition, UnknownPermission> {
    all_definitions()
        .find(|definition| definition.id == id)
        .ok_or_else(|| UnknownPermission(id.to_string()))
}

/// Every catalog entry, canonical ids first.
pub fn all_definitions() -> impl Iterator<Item = &'static PermissionDefinition> {
    CANONICAL.iter().chain(LEGACY.iter())
}

/// Expands a granted id into the canonical permissions it confers.
pub fn expand_grant(granted: &str) -> Vec<Permission> {
    if let Some(permission) = Permission::parse(granted) {
        return vec![permission];
    }
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == granted)
        .map(|(_, permissions)| permissions.to_vec())
        .unwrap_or_default()
}

/// Whether `granted` satisfies `required`, honoring legacy aliases.
pub fn grant_satisfies(granted: &str, required: Permission) -> bool {
    expand_grant(granted).contains(&required)
}

/// Buckets known ids by risk tier. Unknown ids are skipped.
pub fn group_by_risk<'a>(
    ids: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<RiskTier, Vec<&'static PermissionDefinition>> {
    let mut grouped: BTreeMap<RiskTier, Vec<&'static PermissionDefinition>> = BTreeMap::new();
    for id in ids {
        if let Ok(definition) = get(id) {
            grouped.entry(definition.risk).or_default().push(definition);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::{
        all_definitions, expand_grant, get, grant_satisfies, group_by_risk, Permission, RiskTier,
        UnknownPermission,
    };
    use std::collections::BTreeSet;

    #[test]
    fn every_permission_has_its_own_definition() {
        for (index, permission) in Permission::ALL.into_iter().enumerate() {
            assert_eq!(permission as usize, index);
            let definition = permission.definition();
            assert_eq!(definition.id, permission.as_str());
            assert_eq!(get(permission.as_str()).expect("catalog entry"), definition);
        }
        assert_eq!(
            Permission::WalletTransfer.definition().risk,
            RiskTier::High,
            "lookup must not fall back to a low-risk entry"
        );
    }

    #[test]
    fn catalog_ids_are_unique() {
        let ids: BTreeSet<&str> = all_definitions().map(|def| def.id).collect();
        assert_eq!(ids.len(), all_definitions().count());
    }

    #[test]
    fn high_risk_money_paths_require_confirmation() {
        for permission in [
            Permission::WalletTransfer,
            Permission::ContractsDeploy,
            Permission::ContractsExecute,
        ] {
            assert!(permission.definition().requires_confirmation);
        }
        assert_eq!(Permission::ContractsDeploy.definition().risk, RiskTier::Critical);
        assert!(!Permission::StorageRead.definition().requires_confirmation);
    }

    #[test]
    fn unknown_ids_fail_lookup() {
        assert_eq!(
            get("bluetooth"),
            Err(UnknownPermission("bluetooth".to_string()))
        );
        assert!(expand_grant("bluetooth").is_empty());
    }

    #[test]
    fn legacy_aliases_expand_to_canonical_permissions() {
        assert!(grant_satisfies("wallet.balance.read", Permission::WalletRead));
        assert!(grant_satisfies("storage.app", Permission::StorageRead));
        assert!(grant_satisfies("storage.app", Permission::StorageWrite));
        assert!(!grant_satisfies("storage.app", Permission::WalletRead));
        assert!(grant_satisfies("wallet:transfer", Permission::WalletTransfer));
        assert!(!grant_satisfies("wallet:read", Permission::WalletTransfer));
    }

    #[test]
    fn groups_known_ids_by_risk() {
        let grouped = group_by_risk(["wallet:read", "contracts:deploy", "nope", "camera"]);
        assert_eq!(grouped[&RiskTier::Low].len(), 1);
        assert_eq!(grouped[&RiskTier::Critical][0].id, "contracts:deploy");
        assert_eq!(grouped[&RiskTier::Medium][0].id, "camera");
        assert!(!grouped.contains_key(&RiskTier::High));
    }
}
