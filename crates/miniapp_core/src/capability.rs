//! Closed set of capabilities a mini-app may invoke across its boundary.
//!
//! # Responsibility
//! - Parse wire capability keys (`resource:method`) into typed variants.
//! - Map each capability to the permission it requires, if any.
//!
//! # Invariants
//! - Parsing is exact and case-sensitive; unknown keys never resolve.
//! - The capability to permission table is static.

use crate::permission::Permission;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthOp {
    GetCurrentUser,
    GetPermissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletOp {
    GetBalance,
    GetHistory,
    RequestTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Get,
    Set,
    Remove,
    Clear,
    Keys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiOp {
    ShowToast,
    ShowConfirm,
    ShowModal,
    CloseModal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationOp {
    GoTo,
    GoBack,
    OpenApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventsOp {
    Subscribe,
    Unsubscribe,
    Emit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractsOp {
    DeployLoyalty,
    DeployEscrow,
    DeployRevenueSplit,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationOp {
    GetCurrentPosition,
    WatchPosition,
    ClearWatch,
    CalculateDistance,
    Geocode,
    ReverseGeocode,
}

/// Capability requested by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Auth(AuthOp),
    Wallet(WalletOp),
    Storage(StorageOp),
    Ui(UiOp),
    Navigation(NavigationOp),
    Events(EventsOp),
    Contracts(ContractsOp),
    Location(LocationOp),
}

const CAPABILITY_KEYS: &[(&str, Capability)] = &[
    ("auth:getCurrentUser", Capability::Auth(AuthOp::GetCurrentUser)),
    ("auth:getPermissions", Capability::Auth(AuthOp::GetPermissions)),
    ("wallet:getBalance", Capability::Wallet(WalletOp::GetBalance)),
    ("wallet:getHistory", Capability::Wallet(WalletOp::GetHistory)),
    ("wallet:requestTransfer", Capability::Wallet(WalletOp::RequestTransfer)),
    ("storage:get", Capability::Storage(StorageOp::Get)),
    ("storage:set", Capability::Storage(StorageOp::Set)),
    ("storage:remove", Capability::Storage(StorageOp::Remove)),
    ("storage:clear", Capability::Storage(StorageOp::Clear)),
    ("storage:keys", Capability::Storage(StorageOp::Keys)),
    ("ui:showToast", Capability::Ui(UiOp::ShowToast)),
    ("ui:showConfirm", Capability::Ui(UiOp::ShowConfirm)),
    ("ui:showModal", Capability::Ui(UiOp::ShowModal)),
    ("ui:closeModal", Capability::Ui(UiOp::CloseModal)),
    ("navigation:goTo", Capability::Navigation(NavigationOp::GoTo)),
    ("navigation:goBack", Capability::Navigation(NavigationOp::GoBack)),
    ("navigation:openApp", Capability::Navigation(NavigationOp::OpenApp)),
    ("events:subscribe", Capability::Events(EventsOp::Subscribe)),
    ("events:unsubscribe", Capability::Events(EventsOp::Unsubscribe)),
    ("events:emit", Capability::Events(EventsOp::Emit)),
    ("contracts:deployLoyalty", Capability::Contracts(ContractsOp::DeployLoyalty)),
    ("contracts:deployEscrow", Capability::Contracts(ContractsOp::DeployEscrow)),
    (
        "contracts:deployRevenueSplit",
        Capability::Contracts(ContractsOp::DeployRevenueSplit),
    ),
    ("contracts:list", Capability::Contracts(ContractsOp::List)),
    (
        "location:getCurrentPosition",
        Capability::Location(LocationOp::GetCurrentPosition),
    ),
    ("location:watchPosition", Capability::Location(LocationOp::WatchPosition)),
    ("location:clearWatch", Capability::Location(LocationOp::ClearWatch)),
    (
        "location:calculateDistance",
        Capability::Location(LocationOp::CalculateDistance),
    ),
    ("location:geocode", Capability::Location(LocationOp::Geocode)),
    ("location:reverseGeocode", Capability::Location(LocationOp::ReverseGeocode)),
];

impl Capability {
    /// Every capability, in wire-key table order.
    pub fn all() -> impl Iterator<Item = Capability> {
        CAPABILITY_KEYS.iter().map(|(_, capability)| *capability)
    }

    /// Stable wire key.
    pub fn as_str(self) -> &'static str {
        CAPABILITY_KEYS
            .iter()
            .find(|(_, capability)| *capability == self)
            .map(|(key, _)| *key)
            .unwrap_or("unknown")
    }

    /// Permission the caller must hold before the handler runs.
    pub fn required_permission(self) -> Option<Permission> {
        match self {
            Self::Auth(_) | Self::Navigation(_) => None,
            Self::Wallet(WalletOp::GetBalance | WalletOp::GetHistory) => {
                Some(Permission::WalletRead)
            }
            Self::Wallet(WalletOp::RequestTransfer) => Some(Permission::WalletTransfer),
            Self::Storage(StorageOp::Get | StorageOp::Keys) => Some(Permission::StorageRead),
            Self::Storage(StorageOp::Set | StorageOp::Remove | StorageOp::Clear) => {
                Some(Permission::StorageWrite)
            }
            Self::Ui(UiOp::ShowToast) => Some(Permission::UiToast),
            Self::Ui(UiOp::ShowConfirm | UiOp::ShowModal | UiOp::CloseModal) => {
                Some(Permission::UiModal)
            }
            Self::Events(EventsOp::Subscribe | EventsOp::Unsubscribe) => {
                Some(Permission::EventsSubscribe)
            }
            Self::Events(EventsOp::Emit) => Some(Permission::EventsEmit),
            Self::Contracts(ContractsOp::List) => Some(Permission::ContractsRead),
            Self::Contracts(_) => Some(Permission::ContractsDeploy),
            Self::Location(LocationOp::Geocode | LocationOp::ReverseGeocode) => {
                Some(Permission::LocationGeocode)
            }
            Self::Location(_) => Some(Permission::LocationRead),
        }
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses one wire capability key.
pub fn parse_capability(value: &str) -> Result<Capability, CapabilityError> {
    if value.trim().is_empty() {
        return Err(CapabilityError::EmptyCapability);
    }
    CAPABILITY_KEYS
        .iter()
        .find(|(key, _)| *key == value)
        .map(|(_, capability)| *capability)
        .ok_or_else(|| CapabilityError::UnknownCapability(value.to_string()))
}

/// Capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnknownCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "capability must not be empty"),
            Self::UnknownCapability(value) => write!(f, "unknown capability: {value}"),
        }
    }
}

impl Error for CapabilityError {}

#[cfg(test)]
mod tests {
    use super::{
        parse_capability, AuthOp, Capability, CapabilityError, ContractsOp, LocationOp, StorageOp,
        WalletOp,
    };
    use crate::permission::Permission;
    use std::collections::HashSet;

    #[test]
    fn every_capability_round_trips_through_its_key() {
        let all: Vec<Capability> = Capability::all().collect();
        assert_eq!(all.len(), 30);
        for capability in all {
            assert_eq!(
                parse_capability(capability.as_str()).expect("known key"),
                capability
            );
        }
    }

    #[test]
    fn keys_are_unique() {
        let keys: HashSet<&str> = Capability::all().map(Capability::as_str).collect();
        assert_eq!(keys.len(), Capability::all().count());
    }

    #[test]
    fn rejects_unknown_and_miscased_keys() {
        assert_eq!(
            parse_capability("wallet:GetBalance"),
            Err(CapabilityError::UnknownCapability(
                "wallet:GetBalance".to_string()
            ))
        );
        assert_eq!(parse_capability(" "), Err(CapabilityError::EmptyCapability));
    }

    #[test]
    fn maps_required_permissions() {
        assert_eq!(
            Capability::Auth(AuthOp::GetCurrentUser).required_permission(),
            None
        );
        assert_eq!(
            Capability::Wallet(WalletOp::GetBalance).required_permission(),
            Some(Permission::WalletRead)
        );
        assert_eq!(
            Capability::Storage(StorageOp::Clear).required_permission(),
            Some(Permission::StorageWrite)
        );
        assert_eq!(
            Capability::Contracts(ContractsOp::DeployEscrow).required_permission(),
            Some(Permission::ContractsDeploy)
        );
        assert_eq!(
            Capability::Contracts(ContractsOp::List).required_permission(),
            Some(Permission::ContractsRead)
        );
        assert_eq!(
            Capability::Location(LocationOp::CalculateDistance).required_permission(),
            Some(Permission::LocationRead)
        );
        assert_eq!(
            Capability::Location(LocationOp::ReverseGeocode).required_permission(),
            Some(Permission::LocationGeocode)
        );
    }
}
