//! SQLCipher connection pool
//!
//! `r2d2` pool over `r2d2_sqlite` where every new connection is keyed and
//! tuned before it is handed out:
//!
//! 1. `PRAGMA key` (must be the first statement on the connection)
//! 2. SQLCipher 4 compatibility, KDF iterations, memory security
//! 3. WAL journal, `synchronous=NORMAL`, foreign keys, busy timeout
//!
//! A pool opened without a key skips step 1 and 2.

use std::path::Path;
use std::time::Duration;

use clinisync_domain::{CliniSyncError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, instrument, warn};

use crate::errors::{looks_like_wrong_key, InfraError};

/// Pool of SQLCipher connections.
pub type SqlCipherPool = Pool<SqliteConnectionManager>;

/// A connection checked out of [`SqlCipherPool`].
pub type SqlCipherConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const CIPHER_COMPATIBILITY: i32 = 4;
const KDF_ITERATIONS: i32 = 256_000;

#[derive(Debug, Clone)]
pub struct SqlCipherPoolConfig {
    pub max_size: u32,
    /// How long `get()` waits for a free connection.
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl Default for SqlCipherPoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

/// Build the pool and prove the key by reading the schema once.
#[instrument(skip(encryption_key, config), fields(db_path = %path.display(), pool_size = config.max_size))]
pub fn create_sqlcipher_pool(
    path: &Path,
    encryption_key: Option<String>,
    config: SqlCipherPoolConfig,
) -> Result<SqlCipherPool> {
    let pragmas = config.clone();
    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        if let Some(key) = encryption_key.as_deref() {
            configure_sqlcipher(conn, key)?;
        }
        apply_connection_pragmas(conn, &pragmas)
    });

    let pool = Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|e| {
            warn!(error = %e, "failed to create connection pool");
            CliniSyncError::from(InfraError::from(e))
        })?;

    let conn = pool.get().map_err(|e| CliniSyncError::from(InfraError::from(e)))?;
    verify_readable(&conn)?;
    debug!("database key verified");

    Ok(pool)
}

fn configure_sqlcipher(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.pragma_update(None, "key", key)?;
    conn.pragma_update(None, "cipher_compatibility", CIPHER_COMPATIBILITY)?;
    conn.pragma_update(None, "kdf_iter", KDF_ITERATIONS)?;
    conn.pragma_update(None, "cipher_memory_security", "ON")?;
    Ok(())
}

fn apply_connection_pragmas(conn: &Connection, config: &SqlCipherPoolConfig) -> rusqlite::Result<()> {
    let mut pragma_sql = String::new();
    if config.enable_wal {
        pragma_sql.push_str("PRAGMA journal_mode=WAL;\n");
        pragma_sql.push_str("PRAGMA wal_autocheckpoint=1000;\n");
    }
    pragma_sql.push_str("PRAGMA synchronous=NORMAL;\n");
    pragma_sql.push_str("PRAGMA foreign_keys=ON;\n");

    conn.execute_batch(&pragma_sql)?;
    conn.busy_timeout(config.busy_timeout)
}

/// Reading `sqlite_master` forces decryption of the first page.
fn verify_readable(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map(|_| ())
        .map_err(|e| {
            if looks_like_wrong_key(&e.to_string()) {
                CliniSyncError::Config("SQLCipher key rejected or database not encrypted".into())
            } else {
                CliniSyncError::from(InfraError::from(e))
            }
        })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const TEST_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn quick_config() -> SqlCipherPoolConfig {
        SqlCipherPoolConfig {
            max_size: 2,
            connection_timeout: Duration::from_secs(2),
            ..SqlCipherPoolConfig::default()
        }
    }

    #[test]
    fn keyed_pool_applies_pragmas() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("keyed.db");

        let pool =
            create_sqlcipher_pool(&db_path, Some(TEST_KEY.to_string()), quick_config()).unwrap();
        let conn = pool.get().unwrap();

        let journal_mode: String =
            conn.pragma_query_value(None, "journal_mode", |row| row.get(0)).unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
        let foreign_keys: i64 =
            conn.pragma_query_value(None, "foreign_keys", |row| row.get(0)).unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn reopening_with_another_key_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("keyed.db");

        {
            let pool = create_sqlcipher_pool(&db_path, Some(TEST_KEY.to_string()), quick_config())
                .unwrap();
            pool.get().unwrap().execute_batch("CREATE TABLE scratch (id INTEGER);").unwrap();
        }

        let result = create_sqlcipher_pool(
            &db_path,
            Some("a_completely_different_key_0000000000000000000000000000000".to_string()),
            quick_config(),
        );
        assert!(matches!(result, Err(CliniSyncError::Config(_))), "got {result:?}");
    }
}
