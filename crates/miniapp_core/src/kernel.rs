//! Kernel facade owned by the host process.
//!
//! # Responsibility
//! - Construct every kernel component once from a [`KernelConfig`].
//! - Expose registry, grant, session, pending-operation and launch entry
//!   points to the host.
//!
//! # Invariants
//! - Each `Kernel` owns its own state; two kernels never share slots,
//!   sessions or registries.
//! - Responses reach only the boundary of the app that sent the envelope.

use crate::bridge::guard::{GuardSettings, RequestGuard};
use crate::bridge::session::SessionTable;
use crate::bridge::signature::SigningKeys;
use crate::bridge::{dispatcher, AppBoundary, HostContext};
use crate::collab::HostServices;
use crate::config::{ConfigError, KernelConfig};
use crate::geo::{Position, POSITION_UPDATE_EVENT};
use crate::grants::{GrantStore, GrantStoreError};
use crate::kv::KvBackend;
use crate::launcher::{DeepLink, DeepLinkResolver, LaunchError, LaunchOutcome};
use crate::manifest::registry::{
    ManifestQuery, ManifestRegistry, ManifestSource, RegisteredManifest, RegistryError,
};
use crate::manifest::remote::CatalogError;
use crate::manifest::AppManifest;
use crate::pending::{PendingKind, PendingManager, PendingRequest, PendingTimeouts};
use crate::protocol::{now_ms, Envelope, EventMessage, Outbound, Response};
use crate::storage::{AppStorage, StorageLimits};
use crate::sync::lock;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// Kernel-level failures surfaced to the host.
#[derive(Debug)]
pub enum KernelError {
    Config(ConfigError),
    Grants(GrantStoreError),
    Registry(RegistryError),
    Catalog(CatalogError),
    Launch(LaunchError),
    UnknownApp(String),
    NoRemoteCatalog,
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Grants(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
            Self::Catalog(err) => write!(f, "{err}"),
            Self::Launch(err) => write!(f, "{err}"),
            Self::UnknownApp(app_id) => write!(f, "app `{app_id}` is not registered"),
            Self::NoRemoteCatalog => write!(f, "no remote catalog is configured"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Grants(err) => Some(err),
            Self::Registry(err) => Some(err),
            Self::Catalog(err) => Some(err),
            Self::Launch(err) => Some(err),
            Self::UnknownApp(_) | Self::NoRemoteCatalog => None,
        }
    }
}

impl From<ConfigError> for KernelError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<GrantStoreError> for KernelError {
    fn from(value: GrantStoreError) -> Self {
        Self::Grants(value)
    }
}

impl From<RegistryError> for KernelError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<CatalogError> for KernelError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

impl From<LaunchError> for KernelError {
    fn from(value: LaunchError) -> Self {
        Self::Launch(value)
    }
}

/// Capability-gated mini-app kernel. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Kernel {
    ctx: Arc<HostContext>,
}

impl Kernel {
    /// Builds a kernel and loads the grant record of the signed-in user.
    pub fn new(
        config: KernelConfig,
        backend: Arc<dyn KvBackend>,
        services: HostServices,
    ) -> Result<Self, KernelError> {
        config.validate()?;
        let user = services.identity.current_user().map(|user| user.address);
        let grants = GrantStore::load(
            Arc::clone(&backend),
            config.grants_namespace.clone(),
            config.default_installed_apps.clone(),
            user,
        )?;
        let storage = AppStorage::new(
            Arc::clone(&backend),
            config.storage_namespace.clone(),
            StorageLimits::from(&config),
        );
        let ctx = HostContext {
            grants,
            storage,
            pending: Arc::new(PendingManager::new(PendingTimeouts::from(&config))),
            registry: Mutex::new(ManifestRegistry::new()),
            services,
            sessions: SessionTable::default(),
            guard: RequestGuard::new(GuardSettings::from(&config)),
            signing_keys: SigningKeys::default(),
            deep_links: DeepLinkResolver::new(&config.deep_link_scheme, &config.web_hosts),
            contract_log: Mutex::new(()),
            backend,
            config,
        };
        info!("event=kernel_init module=kernel status=ok");
        Ok(Self { ctx: Arc::new(ctx) })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.ctx.config
    }

    // Registry

    /// Registers a manifest shipped with the host.
    pub fn register_native(&self, manifest: AppManifest) -> Result<(), KernelError> {
        lock(&self.ctx.registry).register(manifest, ManifestSource::Native)?;
        Ok(())
    }

    pub fn unregister(&self, app_id: &str) -> bool {
        lock(&self.ctx.registry).unregister(app_id).is_some()
    }

    pub fn manifest(&self, app_id: &str) -> Option<RegisteredManifest> {
        lock(&self.ctx.registry).get(app_id).cloned()
    }

    pub fn search_apps(&self, query: &ManifestQuery) -> Vec<RegisteredManifest> {
        let grants = &self.ctx.grants;
        lock(&self.ctx.registry)
            .search(query, &|app_id: &str| grants.is_installed(app_id))
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn count_by_category(&self) -> BTreeMap<String, usize> {
        lock(&self.ctx.registry).count_by_category()
    }

    /// Fetches the remote catalog and merges it. Returns how many merged.
    ///
    /// The registry stays queryable while the fetch is in flight.
    pub async fn sync_remote_catalog(&self) -> Result<usize, KernelError> {
        let catalog = self
            .ctx
            .services
            .remote_catalog
            .clone()
            .ok_or(KernelError::NoRemoteCatalog)?;
        let records = catalog.fetch_manifests().await.map_err(|err| {
            warn!(
                "event=catalog_sync module=kernel status=error error={}",
                err
            );
            KernelError::Catalog(err)
        })?;
        Ok(lock(&self.ctx.registry).merge_remote(records))
    }

    // Grants and storage

    pub fn grants(&self) -> &GrantStore {
        &self.ctx.grants
    }

    pub fn storage(&self) -> &AppStorage {
        &self.ctx.storage
    }

    /// Saves the active record and loads the record of `user`.
    pub fn switch_user(&self, user: Option<String>) -> Result<(), KernelError> {
        self.ctx.grants.switch_user(user)?;
        Ok(())
    }

    // Sessions

    /// Registers the isolation boundary of `app_id`, replacing any previous one.
    pub fn attach(&self, app_id: &str, boundary: Arc<dyn AppBoundary>) {
        if self.ctx.sessions.attach(app_id, boundary) {
            warn!(
                "event=session_attach module=kernel status=replaced app_id={}",
                app_id
            );
        } else {
            info!("event=session_attach module=kernel status=ok app_id={}", app_id);
        }
    }

    /// Requires every later envelope from `app_id` to carry a valid
    /// signature under `key`.
    pub fn set_signing_key(&self, app_id: &str, key: &[u8]) {
        self.ctx.signing_keys.set(app_id, key);
        info!("event=signing_key module=kernel status=set app_id={}", app_id);
    }

    pub fn remove_signing_key(&self, app_id: &str) -> bool {
        let removed = self.ctx.signing_keys.remove(app_id);
        if removed {
            info!("event=signing_key module=kernel status=removed app_id={}", app_id);
        }
        removed
    }

    /// Dispatches an envelope from `app_id` and delivers the response on
    /// the boundary the envelope arrived through.
    ///
    /// The response is dropped when that boundary was detached in the
    /// meantime, even if another boundary is now attached for the same app.
    pub fn receive(&self, app_id: &str, envelope: Envelope) -> JoinHandle<()> {
        let kernel = self.clone();
        let app_id = app_id.to_string();
        let origin = self.ctx.sessions.boundary(&app_id);
        tokio::spawn(async move {
            let response = kernel.dispatch(&app_id, envelope).await;
            match origin.filter(|boundary| kernel.ctx.sessions.is_attached(&app_id, boundary)) {
                Some(boundary) => boundary.deliver(Outbound::Response(response)),
                None => debug!(
                    "event=deliver module=kernel status=detached app_id={} request_id={}",
                    app_id, response.id
                ),
            }
        })
    }

    /// Dispatches an envelope from `app_id` and returns the response.
    pub async fn dispatch(&self, app_id: &str, envelope: Envelope) -> Response {
        dispatcher::dispatch(&self.ctx, app_id, envelope).await
    }

    /// Tears down the session of `app_id`.
    ///
    /// Pending operations are cancelled and in-flight calls aborted; their
    /// callers observe `SESSION_CLOSED`.
    pub fn close(&self, app_id: &str) {
        let cancelled = self.ctx.pending.cancel_app(app_id);
        let aborted = self.ctx.sessions.close(app_id);
        self.ctx.guard.forget(app_id);
        info!(
            "event=session_close module=kernel status=ok app_id={} cancelled={} aborted={}",
            app_id, cancelled, aborted
        );
    }

    /// Pushes a host event to every subscribed, attached app.
    pub fn publish_event(&self, event: &str, data: Value) -> usize {
        let subscribers = self.ctx.sessions.subscribers(event);
        let message = EventMessage {
            event: event.to_string(),
            data,
            timestamp: now_ms(),
        };
        for (_, boundary) in &subscribers {
            boundary.deliver(Outbound::Event(message.clone()));
        }
        debug!(
            "event=publish module=kernel status=ok name={} delivered={}",
            event,
            subscribers.len()
        );
        subscribers.len()
    }

    /// Pushes a device fix to every active position watch, tagged with the
    /// watch id the app registered.
    pub fn publish_position(&self, position: &Position) -> usize {
        let mut delivered = 0;
        for (watch_ids, boundary) in self.ctx.sessions.watchers() {
            for watch_id in watch_ids {
                boundary.deliver(Outbound::Event(EventMessage {
                    event: POSITION_UPDATE_EVENT.to_string(),
                    data: json!({ "watchId": watch_id, "position": position }),
                    timestamp: now_ms(),
                }));
                delivered += 1;
            }
        }
        debug!(
            "event=publish module=kernel status=ok name={} delivered={}",
            POSITION_UPDATE_EVENT, delivered
        );
        delivered
    }

    // Pending operations

    /// Settles the outstanding operation of `kind` with the host UI's answer.
    pub fn resolve_pending(&self, kind: PendingKind, value: Value) -> bool {
        self.ctx.pending.resolve(kind, value)
    }

    pub fn reject_pending(&self, kind: PendingKind, reason: &str) -> bool {
        self.ctx.pending.reject(kind, reason)
    }

    pub fn pending(&self, kind: PendingKind) -> Option<PendingRequest> {
        self.ctx.pending.outstanding(kind)
    }

    // Launch and links

    pub async fn launch_app(&self, app_id: &str) -> Result<LaunchOutcome, KernelError> {
        let manifest = self
            .ctx
            .manifest(app_id)
            .ok_or_else(|| KernelError::UnknownApp(app_id.to_string()))?;
        let outcome = self.ctx.launcher().launch(&manifest).await?;
        self.ctx.grants.record_app_usage(app_id);
        Ok(outcome)
    }

    pub fn parse_deep_link(&self, raw: &str) -> Option<DeepLink> {
        self.ctx.deep_links.parse(raw)
    }

    pub fn create_deep_link(
        &self,
        app_id: &str,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Option<String> {
        self.ctx.deep_links.create(app_id, path, params)
    }
}
