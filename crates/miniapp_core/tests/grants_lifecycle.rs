mod common;

use common::{
    harness, signed_in_user, FakeContracts, FakeLocation, FakeMinter, FakeWallet, FixedIdentity,
};
use common::{RecordingNavigator, RecordingUi};
use miniapp_core::{
    GrantStore, GrantStoreError, HostServices, Kernel, KernelConfig, KernelError, KvBackend,
    MemoryKvBackend, Permission, SqliteKvBackend,
};
use serde_json::json;
use std::sync::Arc;

fn services(identity: Option<miniapp_core::UserIdentity>) -> HostServices {
    HostServices {
        ui: Arc::new(RecordingUi::default()),
        navigator: Arc::new(RecordingNavigator::default()),
        identity: Arc::new(FixedIdentity(identity)),
        wallet: Arc::new(FakeWallet::default()),
        contracts: Arc::new(FakeContracts::default()),
        token_minter: Arc::new(FakeMinter),
        location: Arc::new(FakeLocation::default()),
        remote_catalog: None,
    }
}

#[test]
fn reinstall_starts_from_a_clean_slate() {
    let h = harness();
    let grants = h.kernel.grants();
    assert!(grants.install_app("demo", &["storage.app".to_string()]));
    grants.pin_app("demo");
    grants.reorder_apps(&["demo".to_string()]);
    grants.set_app_setting("demo", "theme", json!("dark"));
    grants.record_app_usage("demo");

    assert!(grants.uninstall_app("demo"));
    assert!(grants.install_app("demo", &[]));

    let state = grants.snapshot();
    assert!(!state.is_pinned("demo"));
    assert!(!state.app_order.contains_key("demo"));
    assert!(!state.last_used.contains_key("demo"));
    assert!(grants.get_app_setting("demo", "theme").is_none());
    assert!(grants.get_app_permissions("demo").is_empty());
    assert!(!grants.has_permission("demo", Permission::StorageRead));
}

#[test]
fn pinned_then_ordered_apps() {
    let config = KernelConfig {
        default_installed_apps: Vec::new(),
        ..KernelConfig::default()
    };
    let backend = Arc::new(MemoryKvBackend::new());
    let kernel = Kernel::new(config, backend, services(None)).expect("kernel");
    let grants = kernel.grants();
    for app_id in ["a", "b", "c"] {
        grants.install_app(app_id, &[]);
    }
    grants.pin_app("c");
    grants.reorder_apps(&["b".to_string(), "a".to_string()]);
    assert_eq!(grants.ordered_apps(), vec!["c", "b", "a"]);
}

#[test]
fn grants_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("kernel.db");

    {
        let backend = Arc::new(SqliteKvBackend::open(&path).expect("open db"));
        let kernel =
            Kernel::new(KernelConfig::default(), backend, services(Some(signed_in_user())))
                .expect("kernel");
        kernel
            .grants()
            .install_app("demo", &["wallet:read".to_string()]);
    }

    let backend = Arc::new(SqliteKvBackend::open(&path).expect("reopen db"));
    let kernel = Kernel::new(KernelConfig::default(), backend, services(Some(signed_in_user())))
        .expect("kernel after restart");
    assert!(kernel.grants().is_installed("demo"));
    assert!(kernel.grants().has_permission("demo", Permission::WalletRead));

    kernel.switch_user(None).expect("switch to guest");
    assert!(!kernel.grants().is_installed("demo"));
}

#[test]
fn version_one_records_are_migrated_at_load() {
    let backend = Arc::new(MemoryKvBackend::new());
    backend
        .put(
            "miniapp_grants:guest",
            &json!({
                "version": 1,
                "installedApps": ["wallet", "demo", "wallet"],
                "pinnedApps": ["demo", "ghost"],
                "grantedPermissions": {"demo": ["storage.app"], "ghost": ["wallet:read"]},
                "lastUsed": {"demo": "2024-01-01T00:00:00Z"}
            })
            .to_string(),
        )
        .expect("seed v1 record");

    let store = GrantStore::load(backend, "miniapp_grants", Vec::new(), None)
        .expect("migrated load");
    let state = store.snapshot();
    assert_eq!(state.schema_version, 2);
    assert_eq!(state.installed_apps, vec!["wallet", "demo"]);
    assert_eq!(state.pinned_apps, vec!["demo"]);
    assert!(!state.granted_permissions.contains_key("ghost"));
    assert!(state.last_used.is_empty());
    assert!(store.has_permission("demo", Permission::StorageWrite));
}

#[test]
fn newer_records_stop_kernel_start() {
    let backend = Arc::new(MemoryKvBackend::new());
    backend
        .put(
            "miniapp_grants:guest",
            &json!({"schemaVersion": 99, "installedApps": []}).to_string(),
        )
        .expect("seed future record");

    let err = Kernel::new(KernelConfig::default(), backend, services(None))
        .err()
        .expect("future schema must be refused");
    assert!(matches!(
        err,
        KernelError::Grants(GrantStoreError::UnsupportedSchemaVersion { found: 99, .. })
    ));
}
