//! Contracts the kernel requires from host-owned collaborators.
//!
//! # Responsibility
//! - Define the seams to the host UI, router, identity, wallet data, signing,
//!   contract deployment and location services.
//!
//! # Invariants
//! - UI notifications are fire-and-forget; the kernel never waits on them.
//! - Collaborators never receive another app's data.

use crate::geo::{GeoPoint, Position, PositionOptions};
use crate::manifest::remote::RemoteCatalog;
use crate::pending::PendingRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Notification sent to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    #[serde(rename_all = "camelCase")]
    Toast {
        app_id: String,
        message: String,
        variant: Option<String>,
        duration_ms: Option<u64>,
    },
    /// A pending operation needs a confirmation surface.
    PendingRequested(PendingRequest),
    #[serde(rename_all = "camelCase")]
    ShowModal { app_id: String, options: Value },
    #[serde(rename_all = "camelCase")]
    CloseModal { app_id: String },
    /// Event emitted by a mini-app toward the host.
    #[serde(rename_all = "camelCase")]
    AppEvent {
        app_id: String,
        event: String,
        data: Value,
    },
}

pub trait HostUi: Send + Sync {
    fn notify(&self, event: UiEvent);
}

pub trait Navigator: Send + Sync {
    /// In-process route change.
    fn navigate(&self, route: &str);
    fn go_back(&self);
    /// Opens a new top-level browsing context. Returns `false` when blocked.
    fn open_external(&self, url: &str) -> bool;
}

/// Signed-in end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<UserIdentity>;
}

/// Balance record in the smallest unit, as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub symbol: String,
    pub asset_id: String,
    pub free: String,
    pub reserved: String,
    pub frozen: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: String,
    pub to: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub direction: TransferDirection,
    pub extrinsic_hash: Option<String>,
}

/// Transfer a mini-app asks the user to approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[async_trait]
pub trait WalletService: Send + Sync {
    async fn balances(&self, address: &str) -> Result<Vec<TokenBalance>, CollaboratorError>;
    async fn history(
        &self,
        address: &str,
        limit: usize,
        from_block: Option<u64>,
    ) -> Result<Vec<TransferRecord>, CollaboratorError>;
    /// Signs and submits an approved transfer, returning the transaction hash.
    async fn submit_transfer(
        &self,
        from: &str,
        request: &TransferRequest,
    ) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContractKind {
    Loyalty,
    Escrow,
    RevenueSplit,
}

impl ContractKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loyalty => "loyalty",
            Self::Escrow => "escrow",
            Self::RevenueSplit => "revenue-split",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContract {
    pub contract_id: String,
    #[serde(rename = "type")]
    pub kind: ContractKind,
    pub address: String,
    pub tx_hash: String,
    pub deployed_at: u64,
}

#[async_trait]
pub trait ContractService: Send + Sync {
    /// Deploys an approved contract on behalf of `owner`.
    async fn deploy(
        &self,
        owner: &str,
        kind: ContractKind,
        config: &Value,
    ) -> Result<DeployedContract, CollaboratorError>;
}

#[async_trait]
pub trait TokenMinter: Send + Sync {
    /// Mints a short-lived token that identifies `user` to an external app.
    async fn mint_token(
        &self,
        app_id: &str,
        user: &UserIdentity,
    ) -> Result<String, CollaboratorError>;
}

/// Device positioning and geocoding owned by the host.
#[async_trait]
pub trait LocationService: Send + Sync {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, CollaboratorError>;
    /// Resolves a free-form address; `None` when nothing matches.
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, CollaboratorError>;
    async fn reverse_geocode(&self, point: GeoPoint)
        -> Result<Option<String>, CollaboratorError>;
}

/// Collaborator call failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    Unavailable(String),
    Failed(String),
}

impl Display for CollaboratorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "service unavailable: {message}"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

impl Error for CollaboratorError {}

/// Every collaborator the kernel talks to.
#[derive(Clone)]
pub struct HostServices {
    pub ui: Arc<dyn HostUi>,
    pub navigator: Arc<dyn Navigator>,
    pub identity: Arc<dyn IdentityProvider>,
    pub wallet: Arc<dyn WalletService>,
    pub contracts: Arc<dyn ContractService>,
    pub token_minter: Arc<dyn TokenMinter>,
    pub location: Arc<dyn LocationService>,
    pub remote_catalog: Option<Arc<dyn RemoteCatalog>>,
}

#[cfg(test)]
mod tests {
    use super::{ContractKind, DeployedContract, UiEvent};
    use serde_json::json;

    #[test]
    fn ui_events_are_tagged_camel_case() {
        let value = serde_json::to_value(UiEvent::Toast {
            app_id: "demo".to_string(),
            message: "saved".to_string(),
            variant: None,
            duration_ms: Some(1500),
        })
        .expect("ui event json");
        assert_eq!(value["type"], json!("toast"));
        assert_eq!(value["appId"], json!("demo"));
        assert_eq!(value["durationMs"], json!(1500));
    }

    #[test]
    fn deployed_contract_uses_type_field() {
        let contract: DeployedContract = serde_json::from_value(json!({
            "contractId": "c1",
            "type": "revenue-split",
            "address": "5Gx",
            "txHash": "0xabc",
            "deployedAt": 1
        }))
        .expect("contract json");
        assert_eq!(contract.kind, ContractKind::RevenueSplit);
    }
}
