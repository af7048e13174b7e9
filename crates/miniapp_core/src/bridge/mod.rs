//! Host bridge between mini-app isolation boundaries and host resources.
//!
//! # Responsibility
//! - Own the shared kernel state every capability handler reads from.
//! - Route validated envelopes to exactly one typed handler.
//!
//! # See also
//! - `dispatcher` for the ordered admission checks.
//! - `handlers` for per-resource capability implementations.

pub(crate) mod dispatcher;
pub(crate) mod guard;
pub(crate) mod handlers;
pub(crate) mod session;
pub(crate) mod signature;

pub use session::AppBoundary;

use crate::collab::HostServices;
use crate::config::KernelConfig;
use crate::grants::GrantStore;
use crate::kv::KvBackend;
use crate::launcher::{DeepLinkResolver, Launcher};
use crate::manifest::registry::ManifestRegistry;
use crate::manifest::{AppManifest, AppStatus};
use crate::pending::PendingManager;
use crate::storage::AppStorage;
use crate::sync::lock;
use guard::RequestGuard;
use session::SessionTable;
use signature::SigningKeys;
use std::sync::{Arc, Mutex};

/// State shared by the kernel facade and every in-flight handler task.
pub(crate) struct HostContext {
    pub config: KernelConfig,
    pub backend: Arc<dyn KvBackend>,
    pub grants: GrantStore,
    pub storage: AppStorage,
    pub pending: Arc<PendingManager>,
    pub registry: Mutex<ManifestRegistry>,
    pub services: HostServices,
    pub sessions: SessionTable,
    pub guard: RequestGuard,
    pub signing_keys: SigningKeys,
    pub deep_links: DeepLinkResolver,
    // Serializes read-modify-write of per-app contract lists.
    pub contract_log: Mutex<()>,
}

impl HostContext {
    /// Registered manifest for `app_id`, cloned out of the registry lock.
    pub fn manifest(&self, app_id: &str) -> Option<AppManifest> {
        lock(&self.registry)
            .get(app_id)
            .map(|entry| entry.manifest.clone())
    }

    pub fn is_suspended(&self, app_id: &str) -> bool {
        lock(&self.registry)
            .get(app_id)
            .is_some_and(|entry| entry.manifest.status == AppStatus::Suspended)
    }

    pub fn launcher(&self) -> Launcher<'_> {
        Launcher {
            navigator: self.services.navigator.as_ref(),
            identity: self.services.identity.as_ref(),
            token_minter: self.services.token_minter.as_ref(),
            sandbox_route: &self.config.sandbox_route,
        }
    }
}
