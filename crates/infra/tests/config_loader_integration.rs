//! Integration tests for configuration loader
//!
//! Loads real JSON and TOML files from disk and checks defaults and
//! validation end to end.

use std::path::PathBuf;

use clinisync_domain::{CliniSyncError, DuplicateCreatePolicy, EntityKind};
use clinisync_infra::config;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("config file should be written");
    path
}

#[test]
fn json_file_with_every_section() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "clinisync.json",
        r#"{
            "database": {
                "path": "/var/lib/clinisync/clinic.db",
                "pool_size": 4,
                "encryption_key": "db-key-123"
            },
            "remote": {
                "base_url": "https://sandbox.accounting.test",
                "auth_url": "https://sandbox.accounting.test/auth",
                "partner_id": "ClinicOne",
                "request_timeout_secs": 15
            },
            "sync": {
                "max_reconnect_attempts": 3,
                "duplicate_create_policy": "require_review",
                "schedules": [
                    {"kind": "invoice", "cron": "0 */2 * * * *", "batch_size": 10},
                    {"kind": "product", "cron": "0 0 3 * * *", "batch_size": 100, "enabled": false}
                ]
            },
            "logging": {"level": "debug", "json": true}
        }"#,
    );

    let config = config::load_from_file(Some(path)).expect("config should load");

    assert_eq!(config.database.path, "/var/lib/clinisync/clinic.db");
    assert_eq!(config.database.pool_size, 4);
    assert_eq!(config.database.encryption_key.as_deref(), Some("db-key-123"));
    assert_eq!(config.remote.partner_id, "ClinicOne");
    assert_eq!(config.remote.request_timeout_secs, 15);
    assert_eq!(config.remote.credential_key, None);
    assert_eq!(config.sync.max_reconnect_attempts, 3);
    assert_eq!(config.sync.duplicate_create_policy, DuplicateCreatePolicy::RequireReview);
    assert_eq!(config.sync.schedules.len(), 2);
    assert!(config.sync.schedule_for(EntityKind::Invoice).unwrap().enabled);
    assert!(!config.sync.schedule_for(EntityKind::Product).unwrap().enabled);
    assert!(config.sync.schedule_for(EntityKind::Customer).is_none());
    assert!(config.logging.json);
}

#[test]
fn toml_file_with_only_the_database_section() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.toml",
        r#"
[database]
path = "clinic.db"
encryption_key = "toml-key-456"
"#,
    );

    let config = config::load_from_file(Some(path)).expect("config should load");

    assert_eq!(config.database.pool_size, 8);
    assert_eq!(config.remote.base_url, "https://api.siigo.com");
    assert_eq!(config.sync.schedules.len(), EntityKind::ALL.len());
    assert_eq!(config.sync.duplicate_create_policy, DuplicateCreatePolicy::RetryCreate);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn toml_schedules_use_array_tables() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "config.toml",
        r#"
[database]
path = "clinic.db"

[sync]
job_timeout_secs = 90

[sync.fiscal_status]
cron = "0 */30 * * * *"
batch_size = 40

[[sync.schedules]]
kind = "payment_receipt"
cron = "30 */5 * * * *"
batch_size = 25

[[sync.schedules]]
kind = "journal_entry"
cron = "0 15 * * * *"
batch_size = 5
"#,
    );

    let config = config::load_from_file(Some(path)).expect("config should load");

    assert_eq!(config.sync.job_timeout_secs, 90);
    assert_eq!(config.sync.fiscal_status.cron, "0 */30 * * * *");
    assert_eq!(config.sync.fiscal_status.batch_size, 40);
    assert!(config.sync.fiscal_status.enabled);
    let receipts = config.sync.schedule_for(EntityKind::PaymentReceipt).unwrap();
    assert_eq!((receipts.cron.as_str(), receipts.batch_size), ("30 */5 * * * *", 25));
    assert_eq!(config.sync.schedule_for(EntityKind::JournalEntry).unwrap().batch_size, 5);
}

#[test]
fn invalid_values_are_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let five_field_cron = write_config(
        &dir,
        "cron.json",
        r#"{"database": {"path": "c.db"},
            "sync": {"schedules": [{"kind": "invoice", "cron": "*/5 * * * *", "batch_size": 10}]}}"#,
    );
    let bad_url = write_config(
        &dir,
        "url.json",
        r#"{"database": {"path": "c.db"}, "remote": {"base_url": "not a url"}}"#,
    );
    let unknown_policy = write_config(
        &dir,
        "policy.json",
        r#"{"database": {"path": "c.db"}, "sync": {"duplicate_create_policy": "ignore"}}"#,
    );

    for path in [five_field_cron, bad_url, unknown_policy] {
        let result = config::load_from_file(Some(path.clone()));
        assert!(matches!(result, Err(CliniSyncError::Config(_))), "{} should be rejected", path.display());
    }
}

#[test]
fn missing_malformed_and_unsupported_files() {
    let dir = TempDir::new().unwrap();

    let missing = config::load_from_file(Some(dir.path().join("absent.json")));
    assert!(matches!(missing, Err(CliniSyncError::Config(m)) if m.contains("not found")));

    let malformed = write_config(&dir, "broken.toml", "[database\npath = ");
    assert!(matches!(
        config::load_from_file(Some(malformed)),
        Err(CliniSyncError::Config(m)) if m.contains("TOML")
    ));

    let yaml = write_config(&dir, "config.yaml", "database:\n  path: c.db\n");
    assert!(matches!(
        config::load_from_file(Some(yaml)),
        Err(CliniSyncError::Config(m)) if m.contains("Unsupported")
    ));
}
