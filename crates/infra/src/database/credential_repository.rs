//! Credential repository
//!
//! Remote accounting credentials live in the primary database with the access
//! key sealed by [`CredentialCipher`]. Saving a new set deactivates the
//! previous one; at most one row is active.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clinisync_common::CredentialCipher;
use clinisync_core::CredentialStore;
use clinisync_domain::{CliniSyncError, Credentials, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::columns::{to_millis, with_connection};
use super::manager::{map_sql_error, DbManager};
use crate::errors::InfraError;

/// SqlCipher-based credential store
pub struct SqlCipherCredentialStore {
    db: Arc<DbManager>,
    cipher: Arc<CredentialCipher>,
}

impl SqlCipherCredentialStore {
    pub fn new(db: Arc<DbManager>, cipher: CredentialCipher) -> Self {
        Self { db, cipher: Arc::new(cipher) }
    }
}

struct SealedRow {
    username: String,
    access_key_sealed: String,
    key_fingerprint: String,
    partner_id: Option<String>,
}

#[async_trait]
impl CredentialStore for SqlCipherCredentialStore {
    async fn load_active(&self) -> Result<Option<Credentials>> {
        let cipher = Arc::clone(&self.cipher);
        with_connection(&self.db, move |conn| {
            let Some(row) = query_active(conn)? else {
                return Ok(None);
            };
            if row.key_fingerprint != cipher.fingerprint() {
                return Err(CliniSyncError::Config(
                    "stored credentials were sealed with a different credential key".into(),
                ));
            }
            let access_key = cipher
                .open(&row.access_key_sealed)
                .map_err(|e| CliniSyncError::from(InfraError::from(e)))?;
            Ok(Some(Credentials {
                username: row.username,
                access_key,
                partner_id: row.partner_id,
            }))
        })
        .await
    }

    async fn save(&self, credentials: &Credentials) -> Result<()> {
        let cipher = Arc::clone(&self.cipher);
        let credentials = credentials.clone();
        with_connection(&self.db, move |conn| {
            let sealed = cipher
                .seal(&credentials.access_key)
                .map_err(|e| CliniSyncError::from(InfraError::from(e)))?;
            replace_active(conn, &credentials, &sealed, &cipher.fingerprint())
        })
        .await?;
        info!("accounting credentials replaced");
        Ok(())
    }

    async fn record_sign_in(&self, at: DateTime<Utc>) -> Result<()> {
        with_connection(&self.db, move |conn| {
            conn.execute(
                "UPDATE accounting_credentials SET last_sign_in_at = ?1 WHERE active = 1",
                params![to_millis(at)],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

fn query_active(conn: &Connection) -> Result<Option<SealedRow>> {
    conn.query_row(
        "SELECT username, access_key_sealed, key_fingerprint, partner_id
         FROM accounting_credentials WHERE active = 1",
        [],
        |row| {
            Ok(SealedRow {
                username: row.get(0)?,
                access_key_sealed: row.get(1)?,
                key_fingerprint: row.get(2)?,
                partner_id: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(map_sql_error)
}

fn replace_active(
    conn: &Connection,
    credentials: &Credentials,
    sealed: &str,
    fingerprint: &str,
) -> Result<()> {
    let tx = conn.unchecked_transaction().map_err(map_sql_error)?;
    tx.execute("UPDATE accounting_credentials SET active = 0 WHERE active = 1", [])
        .map_err(map_sql_error)?;
    tx.execute(
        "INSERT INTO accounting_credentials
             (username, access_key_sealed, key_fingerprint, partner_id, active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![
            credentials.username,
            sealed,
            fingerprint,
            credentials.partner_id,
            to_millis(Utc::now())
        ],
    )
    .map_err(map_sql_error)?;
    tx.commit().map_err(map_sql_error)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn database() -> (Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DbManager::quick(&temp_dir.path().join("creds.db"), Some(TEST_KEY)).unwrap();
        db.run_migrations().unwrap();
        (Arc::new(db), temp_dir)
    }

    fn store(db: &Arc<DbManager>, passphrase: &str) -> SqlCipherCredentialStore {
        SqlCipherCredentialStore::new(Arc::clone(db), CredentialCipher::new(passphrase).unwrap())
    }

    fn credentials(username: &str, access_key: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            access_key: access_key.to_string(),
            partner_id: Some("CliniSync".to_string()),
        }
    }

    #[tokio::test]
    async fn empty_store_has_no_active_credentials() {
        let (db, _dir) = database();
        let store = store(&db, "passphrase-1");
        assert!(store.load_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_previous_and_seals_the_key() {
        let (db, _dir) = database();
        let store = store(&db, "passphrase-1");

        store.save(&credentials("old@clinic.test", "old-key")).await.unwrap();
        store.save(&credentials("billing@clinic.test", "new-key")).await.unwrap();

        let active = store.load_active().await.unwrap().unwrap();
        assert_eq!(active.username, "billing@clinic.test");
        assert_eq!(active.access_key, "new-key");

        let conn = db.get_connection().unwrap();
        let (rows, active_rows): (i64, i64) = conn
            .query_row("SELECT COUNT(*), SUM(active) FROM accounting_credentials", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!((rows, active_rows), (2, 1));

        let stored: String = conn
            .query_row(
                "SELECT access_key_sealed FROM accounting_credentials WHERE active = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!stored.contains("new-key"));
    }

    #[tokio::test]
    async fn different_passphrase_is_a_configuration_error() {
        let (db, _dir) = database();
        store(&db, "passphrase-1").save(&credentials("billing@clinic.test", "key")).await.unwrap();

        let err = store(&db, "passphrase-2").load_active().await.unwrap_err();
        assert!(matches!(err, CliniSyncError::Config(_)));
    }

    #[tokio::test]
    async fn sign_in_time_is_recorded_on_the_active_row() {
        let (db, _dir) = database();
        let store = store(&db, "passphrase-1");
        store.save(&credentials("billing@clinic.test", "key")).await.unwrap();

        let at = Utc::now();
        store.record_sign_in(at).await.unwrap();

        let stored: Option<i64> = db
            .get_connection()
            .unwrap()
            .query_row(
                "SELECT last_sign_in_at FROM accounting_credentials WHERE active = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(stored, Some(at.timestamp_millis()));
    }
}
