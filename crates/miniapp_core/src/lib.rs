//! Core of the mini-app sandbox kernel.
//! This crate is the single source of truth for permission, isolation and
//! approval invariants.

pub mod bridge;
pub mod capability;
pub mod collab;
pub mod config;
pub mod db;
pub mod geo;
pub mod grants;
pub mod kernel;
pub mod kv;
pub mod launcher;
pub mod logging;
pub mod manifest;
pub mod pending;
pub mod permission;
pub mod protocol;
pub mod storage;
mod sync;

pub use bridge::handlers::HandlerError;
pub use bridge::signature::{sign_envelope, SignatureError};
pub use bridge::AppBoundary;
pub use capability::{parse_capability, Capability, CapabilityError};
pub use collab::{
    CollaboratorError, ContractKind, ContractService, DeployedContract, HostServices, HostUi,
    IdentityProvider, LocationService, Navigator, TokenBalance, TokenMinter, TransferDirection,
    TransferRecord, TransferRequest, UiEvent, UserIdentity, WalletService,
};
pub use config::{ConfigError, KernelConfig};
pub use geo::{GeoPoint, Position, PositionCoords, PositionOptions};
pub use grants::{GrantStore, GrantStoreError, UserGrantState};
pub use kernel::{Kernel, KernelError};
pub use kv::{KvBackend, KvError, KvResult, MemoryKvBackend, SqliteKvBackend};
pub use launcher::{DeepLink, DeepLinkResolver, LaunchError, LaunchOutcome};
pub use logging::{default_log_level, init_logging, logging_status};
pub use manifest::registry::{
    ManifestQuery, ManifestRegistry, ManifestSource, RegisteredManifest, RegistryError,
};
#[cfg(feature = "remote-catalog")]
pub use manifest::remote::HttpRemoteCatalog;
pub use manifest::remote::{CatalogError, RemoteCatalog};
pub use manifest::{
    AppManifest, AppStatus, AuthMethod, LaunchMode, ManifestPermission, ManifestValidationError,
};
pub use pending::{PendingKind, PendingOutcome, PendingRequest};
pub use permission::{Permission, PermissionDefinition, RiskTier, UnknownPermission};
pub use protocol::{
    Envelope, ErrorCode, EventMessage, Outbound, Response, ResponseError, PROTOCOL_VERSION,
};
pub use storage::{AppStorage, StorageError, StorageLimits};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
