#![allow(dead_code)]

use async_trait::async_trait;
use miniapp_core::{
    AppBoundary, AppManifest, AppStatus, AuthMethod, CatalogError, CollaboratorError,
    ContractKind, ContractService, DeployedContract, Envelope, GeoPoint, HostServices, HostUi,
    IdentityProvider, Kernel, KernelConfig, LaunchMode, LocationService, ManifestPermission,
    MemoryKvBackend, Navigator, Outbound, PendingKind, PendingRequest, Position, PositionCoords,
    PositionOptions, RemoteCatalog, TokenBalance, TokenMinter, TransferRecord, TransferRequest,
    UiEvent, UserIdentity, WalletService,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const USER_ADDRESS: &str = "5Gdemo";

#[derive(Default)]
pub struct RecordingUi {
    pub events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().expect("ui events lock").clone()
    }
}

impl HostUi for RecordingUi {
    fn notify(&self, event: UiEvent) {
        self.events.lock().expect("ui events lock").push(event);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub routes: Mutex<Vec<String>>,
    pub opened: Mutex<Vec<String>>,
    pub back_calls: AtomicUsize,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().expect("routes lock").clone()
    }

    pub fn back_calls(&self) -> usize {
        self.back_calls.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().expect("routes lock").push(route.to_string());
    }

    fn go_back(&self) {
        self.back_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn open_external(&self, url: &str) -> bool {
        self.opened.lock().expect("opened lock").push(url.to_string());
        true
    }
}

pub struct FixedIdentity(pub Option<UserIdentity>);

impl IdentityProvider for FixedIdentity {
    fn current_user(&self) -> Option<UserIdentity> {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct FakeWallet {
    pub calls: AtomicUsize,
    pub submitted: Mutex<Vec<TransferRequest>>,
    /// When set, balance lookups never complete.
    pub stall: AtomicBool,
}

impl FakeWallet {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletService for FakeWallet {
    async fn balances(&self, _address: &str) -> Result<Vec<TokenBalance>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(vec![TokenBalance {
            symbol: "BZR".to_string(),
            asset_id: "native".to_string(),
            free: "2500000000000".to_string(),
            reserved: "0".to_string(),
            frozen: "0".to_string(),
            decimals: 12,
        }])
    }

    async fn history(
        &self,
        _address: &str,
        _limit: usize,
        _from_block: Option<u64>,
    ) -> Result<Vec<TransferRecord>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn submit_transfer(
        &self,
        _from: &str,
        request: &TransferRequest,
    ) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .lock()
            .expect("submitted lock")
            .push(request.clone());
        Ok("0xfeed".to_string())
    }
}

#[derive(Default)]
pub struct FakeContracts {
    pub deployed: AtomicUsize,
}

#[async_trait]
impl ContractService for FakeContracts {
    async fn deploy(
        &self,
        _owner: &str,
        kind: ContractKind,
        _config: &Value,
    ) -> Result<DeployedContract, CollaboratorError> {
        let n = self.deployed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DeployedContract {
            contract_id: format!("contract-{n}"),
            kind,
            address: format!("5Gcontract{n}"),
            tx_hash: format!("0xdeploy{n}"),
            deployed_at: 1_700_000_000_000,
        })
    }
}

pub struct FakeMinter;

#[async_trait]
impl TokenMinter for FakeMinter {
    async fn mint_token(
        &self,
        app_id: &str,
        user: &UserIdentity,
    ) -> Result<String, CollaboratorError> {
        Ok(format!("{app_id}.{}", user.address))
    }
}

pub fn fixed_position() -> Position {
    Position {
        coords: PositionCoords {
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: 12.0,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: None,
        },
        timestamp: 1_700_000_000_000,
    }
}

#[derive(Default)]
pub struct FakeLocation {
    pub requests: Mutex<Vec<PositionOptions>>,
    /// When set, position requests never complete.
    pub stall: AtomicBool,
}

#[async_trait]
impl LocationService for FakeLocation {
    async fn current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<Position, CollaboratorError> {
        self.requests.lock().expect("requests lock").push(*options);
        if self.stall.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(fixed_position())
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, CollaboratorError> {
        Ok((address == "Avenida Paulista").then(|| GeoPoint::new(-23.5614, -46.6559)))
    }

    async fn reverse_geocode(
        &self,
        point: GeoPoint,
    ) -> Result<Option<String>, CollaboratorError> {
        Ok((point.latitude < 0.0).then(|| "São Paulo, Brazil".to_string()))
    }
}

pub struct StaticCatalog(pub Vec<Value>);

#[async_trait]
impl RemoteCatalog for StaticCatalog {
    async fn fetch_manifests(&self) -> Result<Vec<Value>, CatalogError> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct CollectingBoundary {
    pub messages: Mutex<Vec<Outbound>>,
}

impl CollectingBoundary {
    pub fn messages(&self) -> Vec<Outbound> {
        self.messages.lock().expect("boundary lock").clone()
    }
}

impl AppBoundary for CollectingBoundary {
    fn deliver(&self, message: Outbound) {
        self.messages.lock().expect("boundary lock").push(message);
    }
}

pub struct Harness {
    pub kernel: Kernel,
    pub ui: Arc<RecordingUi>,
    pub navigator: Arc<RecordingNavigator>,
    pub wallet: Arc<FakeWallet>,
    pub contracts: Arc<FakeContracts>,
    pub location: Arc<FakeLocation>,
    pub backend: Arc<MemoryKvBackend>,
}

pub fn signed_in_user() -> UserIdentity {
    UserIdentity {
        address: USER_ADDRESS.to_string(),
        handle: Some("demo".to_string()),
        display_name: Some("Demo User".to_string()),
        avatar_url: None,
    }
}

pub fn harness() -> Harness {
    harness_with(KernelConfig::default(), None)
}

pub fn harness_with(config: KernelConfig, catalog: Option<Arc<dyn RemoteCatalog>>) -> Harness {
    let ui = Arc::new(RecordingUi::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let wallet = Arc::new(FakeWallet::default());
    let contracts = Arc::new(FakeContracts::default());
    let location = Arc::new(FakeLocation::default());
    let backend = Arc::new(MemoryKvBackend::new());
    let services = HostServices {
        ui: ui.clone(),
        navigator: navigator.clone(),
        identity: Arc::new(FixedIdentity(Some(signed_in_user()))),
        wallet: wallet.clone(),
        contracts: contracts.clone(),
        token_minter: Arc::new(FakeMinter),
        location: location.clone(),
        remote_catalog: catalog,
    };
    let kernel = Kernel::new(config, backend.clone(), services).expect("kernel init");
    Harness {
        kernel,
        ui,
        navigator,
        wallet,
        contracts,
        location,
        backend,
    }
}

pub fn manifest(id: &str, permissions: &[&str]) -> AppManifest {
    AppManifest {
        id: id.to_string(),
        name: format!("{id} app"),
        description: String::new(),
        version: "1.0.0".to_string(),
        category: "tools".to_string(),
        tags: Vec::new(),
        permissions: permissions
            .iter()
            .map(|id| ManifestPermission {
                id: id.to_string(),
                optional: false,
                reason: None,
            })
            .collect(),
        launch_mode: LaunchMode::Internal,
        entry_point: format!("/app/{id}"),
        external_url: None,
        auth_method: AuthMethod::None,
        status: AppStatus::Stable,
    }
}

pub fn install(harness: &Harness, app_id: &str, grants: &[&str]) {
    let grants: Vec<String> = grants.iter().map(|id| id.to_string()).collect();
    harness.kernel.grants().install_app(app_id, &grants);
}

pub fn envelope(id: &str, capability: &str, payload: Value) -> Envelope {
    Envelope::new(id, capability, payload)
}

/// Polls until an operation of `kind` is outstanding.
pub async fn wait_for_pending(kernel: &Kernel, kind: PendingKind) -> PendingRequest {
    for _ in 0..1_000 {
        if let Some(request) = kernel.pending(kind) {
            return request;
        }
        tokio::task::yield_now().await;
    }
    panic!("no {kind} operation became pending");
}
