//! Engine constants
//!
//! Defaults for configuration and the fixed identifiers the remote
//! accounting service expects.

// Remote service
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.siigo.com";
pub const DEFAULT_REMOTE_AUTH_URL: &str = "https://api.siigo.com/auth";
pub const DEFAULT_PARTNER_ID: &str = "CliniSync";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Transport attempts for repeatable requests, first try included.
pub const REMOTE_CALL_ATTEMPTS: u32 = 3;
pub const REMOTE_RETRY_BASE_DELAY_MS: u64 = 200;
pub const REMOTE_RETRY_MAX_DELAY_MS: u64 = 5_000;

// Session
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 60_000;

// Reconciliation
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POOL_SIZE: u32 = 8;
pub const DEFAULT_PENDING_ERRORS_LIMIT: usize = 50;

// Fiscal status follow-up
pub const DEFAULT_FISCAL_STATUS_CRON: &str = "0 */15 * * * *";
pub const DEFAULT_FISCAL_STATUS_BATCH: usize = 50;

/// Identification used for sales to unregistered buyers.
pub const GENERIC_COUNTERPARTY_IDENTIFICATION: &str = "222222222222";
pub const GENERIC_COUNTERPARTY_NAME: &str = "CONSUMIDOR FINAL";

/// Replacement for secret values in persisted payloads.
pub const REDACTION_MARKER: &str = "***REDACTED***";
