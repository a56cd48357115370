//! Database implementations

mod columns;

pub mod audit_log_repository;
pub mod credential_repository;
pub mod manager;
pub mod sqlcipher_pool;
pub mod sync_ledger_repository;

pub use audit_log_repository::SqlCipherAuditLog;
pub use credential_repository::SqlCipherCredentialStore;
pub use manager::DbManager;
pub use sqlcipher_pool::{SqlCipherConnection, SqlCipherPool, SqlCipherPoolConfig};
pub use sync_ledger_repository::SqlCipherSyncLedger;
