//! Runtime wiring: database, HTTP client and background services started
//! from a single `Config`.

#[path = "support.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use clinisync_core::testing::{fixtures, InMemoryEntityStore};
use clinisync_domain::{CliniSyncError, EntityKind, EntitySnapshot, SyncState};
use clinisync_infra::SyncRuntime;
use serde_json::json;
use support::{config_for, credentials, mount_sign_in};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for_state(runtime: &SyncRuntime, kind: EntityKind, id: &str, state: SyncState) -> bool {
    let ledger = clinisync_infra::SqlCipherSyncLedger::new(runtime.database().clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = clinisync_core::SyncLedger::get(&ledger, kind, id).await.ok().flatten();
            if record.is_some_and(|record| record.state == state) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}

#[tokio::test(flavor = "multi_thread")]
async fn runtime_starts_without_credentials_and_syncs_after_they_are_saved() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "R-P1"})))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryEntityStore::default());
    store.insert(EntitySnapshot::Product(fixtures::product("p-1", "MED-1")));

    let runtime =
        SyncRuntime::start(config_for(&server, &dir.path().join("runtime.db")), store.clone(), None)
            .await
            .expect("runtime starts without credentials");
    assert!(!runtime.service().session().is_connected());

    runtime.service().save_credentials(&credentials()).await.unwrap();
    assert!(runtime.service().session().is_connected());

    runtime.queue().submit(EntityKind::Product, "p-1").unwrap();
    assert!(wait_for_state(&runtime, EntityKind::Product, "p-1", SyncState::Synced).await);
    assert_eq!(store.assignment(EntityKind::Product, "p-1").unwrap().remote_id, "R-P1");

    runtime.shutdown().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread")]
async fn credentials_survive_a_restart() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir.path().join("runtime.db"));

    let first =
        SyncRuntime::start(config.clone(), Arc::new(InMemoryEntityStore::default()), None).await.unwrap();
    first.service().save_credentials(&credentials()).await.unwrap();
    first.shutdown().await.unwrap();

    let second =
        SyncRuntime::start(config, Arc::new(InMemoryEntityStore::default()), None).await.unwrap();
    assert!(second.service().session().is_connected(), "stored credentials sign in on start");
    second.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_database_key_is_a_configuration_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir.path().join("runtime.db"));

    let runtime =
        SyncRuntime::start(config.clone(), Arc::new(InMemoryEntityStore::default()), None).await.unwrap();
    runtime.shutdown().await.unwrap();

    let mut wrong_key = config;
    wrong_key.database.encryption_key = Some("another_key_entirely_0123456789".to_string());
    let result = SyncRuntime::start(wrong_key, Arc::new(InMemoryEntityStore::default()), None).await;

    assert!(matches!(result, Err(CliniSyncError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_does_not_wait_out_a_reconnect_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok-live", "expires_in": 86400})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(clinisync_core::sync::HEALTH_CHECK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&server, &dir.path().join("runtime.db"));
    config.sync.health_check_interval_secs = 1;
    config.sync.max_reconnect_attempts = 5;
    config.sync.reconnect_delay_ms = 30_000;
    config.sync.reconnect_max_delay_ms = 60_000;

    let runtime =
        SyncRuntime::start(config, Arc::new(InMemoryEntityStore::default()), None).await.unwrap();
    runtime.service().save_credentials(&credentials()).await.unwrap();

    // The failed check signs in again, is refused and settles into a 30 s backoff.
    tokio::time::sleep(Duration::from_millis(1_800)).await;
    let sign_ins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/auth")
        .count();
    assert_eq!(sign_ins, 2, "health check should have attempted one reconnect");

    let stopped = tokio::time::timeout(Duration::from_secs(3), runtime.shutdown()).await;
    assert!(matches!(stopped, Ok(Ok(()))), "shutdown should finish cleanly, got {stopped:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_start_leaves_no_health_checks_running() {
    let server = MockServer::start().await;
    mount_sign_in(&server).await;
    support::mount_health_check(&server).await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, &dir.path().join("runtime.db"));

    let first =
        SyncRuntime::start(config.clone(), Arc::new(InMemoryEntityStore::default()), None).await.unwrap();
    first.service().save_credentials(&credentials()).await.unwrap();
    first.shutdown().await.unwrap();

    let mut broken = config;
    broken.sync.health_check_interval_secs = 1;
    broken.sync.schedules[0].cron = "not a cron".to_string();
    let result = SyncRuntime::start(broken, Arc::new(InMemoryEntityStore::default()), None).await;
    assert!(matches!(result, Err(CliniSyncError::Config(_))), "got {:?}", result.err());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let health_checks = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == clinisync_core::sync::HEALTH_CHECK_PATH)
        .count();
    assert_eq!(health_checks, 0);
}
