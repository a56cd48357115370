//! Shared fixtures for the infra integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clinisync_common::CredentialCipher;
use clinisync_core::testing::InMemoryEntityStore;
use clinisync_core::{EnginePorts, EngineSettings, SyncService};
use clinisync_domain::{Config, Credentials, DatabaseConfig, LoggingConfig, RemoteConfig, SyncConfig};
use clinisync_infra::database::{
    DbManager, SqlCipherAuditLog, SqlCipherCredentialStore, SqlCipherSyncLedger,
};
use clinisync_infra::HttpAccountingClient;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const TEST_CREDENTIAL_KEY: &str = "credential-passphrase";

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Fresh SQLCipher database with the schema applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("clinisync.db");
        let manager = open(&path, TEST_DB_KEY);
        Self { manager: Arc::new(manager), path, _temp_dir: temp_dir }
    }

    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn open(path: &std::path::Path, key: &str) -> DbManager {
    let manager = DbManager::new(path, 2, Some(key)).expect("db manager should be created");
    manager.run_migrations().expect("migrations should apply");
    manager
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "billing@clinic.test".to_string(),
        access_key: "live-access-key".to_string(),
        partner_id: Some("ClinicOne".to_string()),
    }
}

/// Configuration pointing at `server`, with fast reconnects.
pub fn config_for(server: &MockServer, db_path: &std::path::Path) -> Config {
    Config {
        database: DatabaseConfig {
            path: db_path.display().to_string(),
            pool_size: 2,
            encryption_key: Some(TEST_DB_KEY.to_string()),
        },
        remote: RemoteConfig {
            base_url: server.uri(),
            auth_url: format!("{}/auth", server.uri()),
            partner_id: "CliniSync".to_string(),
            request_timeout_secs: 5,
            credential_key: Some(TEST_CREDENTIAL_KEY.to_string()),
        },
        sync: SyncConfig {
            max_reconnect_attempts: 2,
            reconnect_delay_ms: 10,
            reconnect_max_delay_ms: 20,
            ..SyncConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}

/// Accept any sign-in with a day-long token.
pub async fn mount_sign_in(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok-live", "expires_in": 86400})),
        )
        .mount(server)
        .await;
}

pub async fn mount_health_check(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(clinisync_core::sync::HEALTH_CHECK_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

/// A [`SyncService`] over SQLCipher repositories and the HTTP client.
pub struct Engine {
    pub db: TestDatabase,
    pub store: Arc<InMemoryEntityStore>,
    pub ledger: Arc<SqlCipherSyncLedger>,
    pub audit: Arc<SqlCipherAuditLog>,
    pub service: Arc<SyncService>,
}

impl Engine {
    pub fn new(server: &MockServer) -> Self {
        let db = TestDatabase::new();
        let config = config_for(server, &db.path);
        let store = Arc::new(InMemoryEntityStore::default());
        let ledger = Arc::new(SqlCipherSyncLedger::new(db.manager.clone()));
        let audit = Arc::new(SqlCipherAuditLog::new(db.manager.clone()));
        let cipher = CredentialCipher::new(TEST_CREDENTIAL_KEY).expect("cipher");

        let service = Arc::new(SyncService::new(
            EnginePorts {
                api: Arc::new(HttpAccountingClient::new(&config.remote).expect("http client")),
                credentials: Arc::new(SqlCipherCredentialStore::new(db.manager.clone(), cipher)),
                ledger: ledger.clone(),
                audit_log: audit.clone(),
                store: store.clone(),
            },
            EngineSettings::from_config(&config),
        ));

        Self { db, store, ledger, audit, service }
    }
}
