//! Database connection manager backed by the SQLCipher pool.

use std::path::{Path, PathBuf};

use clinisync_domain::{CliniSyncError, DatabaseConfig, Result};
use rusqlite::params;
use tracing::{info, warn};

use super::sqlcipher_pool::{
    create_sqlcipher_pool, SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig,
};
use crate::errors::InfraError;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Database manager that wraps an [`SqlCipherPool`].
pub struct DbManager {
    pool: SqlCipherPool,
    path: PathBuf,
}

impl DbManager {
    /// Create a new manager with the given pool size and SQLCipher key.
    ///
    /// Without a key the file is opened as plain SQLite.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        pool_size: u32,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let config =
            SqlCipherPoolConfig { max_size: pool_size.max(1), ..SqlCipherPoolConfig::default() };
        Self::with_config(db_path, encryption_key, config)
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.path, config.pool_size, config.encryption_key.as_deref())
    }

    pub fn with_config<P: AsRef<Path>>(
        db_path: P,
        encryption_key: Option<&str>,
        config: SqlCipherPoolConfig,
    ) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if encryption_key.is_none() {
            warn!(db_path = %path.display(), "opening database without encryption");
        }

        let max_connections = config.max_size;
        let pool =
            create_sqlcipher_pool(&path, encryption_key.map(ToOwned::to_owned), config)?;

        info!(db_path = %path.display(), max_connections, "sqlcipher pool initialised");

        Ok(Self { pool, path })
    }

    /// Borrow the underlying SQLCipher pool.
    pub fn pool(&self) -> &SqlCipherPool {
        &self.pool
    }

    /// Acquire a connection from the pool.
    pub fn get_connection(&self) -> Result<SqlCipherConnection> {
        self.pool.get().map_err(|e| CliniSyncError::from(InfraError::from(e)))
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
            params![SCHEMA_VERSION],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify a connection can be acquired and answers a trivial query.
    pub fn health_check(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0)).map_err(map_sql_error)?;
        Ok(())
    }

    /// Shorthand used by tests that need a fast failure on a bad key.
    #[cfg(test)]
    pub(crate) fn quick(db_path: &Path, encryption_key: Option<&str>) -> Result<Self> {
        let config = SqlCipherPoolConfig {
            max_size: 2,
            connection_timeout: std::time::Duration::from_secs(2),
            ..SqlCipherPoolConfig::default()
        };
        Self::with_config(db_path, encryption_key, config)
    }
}

pub(crate) fn map_sql_error(err: rusqlite::Error) -> CliniSyncError {
    CliniSyncError::from(InfraError::from(err))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "clinic-ledger-key";

    #[test]
    fn schema_has_ledger_audit_and_credential_tables() {
        let dir = TempDir::new().unwrap();
        let manager = DbManager::quick(&dir.path().join("clinic.db"), Some(TEST_KEY)).unwrap();
        manager.run_migrations().unwrap();

        let conn = manager.get_connection().unwrap();
        let mut tables = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        tables.retain(|name| !name.starts_with("sqlite_"));
        assert_eq!(tables, ["accounting_credentials", "audit_log", "schema_version", "sync_ledger"]);

        let version: i32 =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert_eq!(manager.path(), dir.path().join("clinic.db").as_path());
    }

    #[test]
    fn unencrypted_database_is_allowed() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::quick(&temp_dir.path().join("plain.db"), None).unwrap();
        manager.run_migrations().unwrap();
        manager.health_check().unwrap();
    }

    #[test]
    fn ledger_rejects_unknown_state() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::quick(&temp_dir.path().join("test.db"), Some(TEST_KEY)).unwrap();
        manager.run_migrations().unwrap();

        let conn = manager.get_connection().unwrap();
        let result = conn.execute(
            "INSERT INTO sync_ledger (kind, entity_id, state, created_at, updated_at)
             VALUES ('invoice', 'inv-1', 'sent', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }
}
