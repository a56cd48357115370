//! Configuration structures
//!
//! Credentials for the remote accounting service are not part of this
//! configuration: they are stored encrypted in the primary database.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::types::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// SQLCipher key. `None` opens the database unencrypted.
    pub encryption_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub auth_url: String,
    /// Partner header value identifying this integration.
    pub partner_id: String,
    pub request_timeout_secs: u64,
    /// Passphrase protecting stored credentials.
    pub credential_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_REMOTE_BASE_URL.to_string(),
            auth_url: constants::DEFAULT_REMOTE_AUTH_URL.to_string(),
            partner_id: constants::DEFAULT_PARTNER_ID.to_string(),
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            credential_key: None,
        }
    }
}

impl RemoteConfig {
    /// Timeout of a single HTTP attempt, connect included.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Deadline for one logical remote call: every transport attempt plus
    /// the longest pause between them.
    pub fn call_deadline(&self) -> Duration {
        let pauses = constants::REMOTE_CALL_ATTEMPTS.saturating_sub(1);
        self.attempt_timeout() * constants::REMOTE_CALL_ATTEMPTS
            + Duration::from_millis(constants::REMOTE_RETRY_MAX_DELAY_MS) * pauses
    }
}

/// What to do when a create may already have reached the remote and the
/// kind has no natural-key lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateCreatePolicy {
    /// Send the create again and log a warning.
    #[default]
    RetryCreate,
    /// Refuse with `DuplicateCreateRisk` until an operator reconciles.
    RequireReview,
}

/// Reconciliation cadence for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSchedule {
    pub kind: EntityKind,
    /// Six-field cron expression (`sec min hour day month weekday`).
    pub cron: String,
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub health_check_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Upper bound for one reconciliation run.
    pub job_timeout_secs: u64,
    pub duplicate_create_policy: DuplicateCreatePolicy,
    pub schedules: Vec<KindSchedule>,
    /// Follow-up on the tax authority's verdict for issued documents.
    pub fiscal_status: FiscalStatusSchedule,
}

/// Cadence of the fiscal status check for invoices and credit notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalStatusSchedule {
    pub cron: String,
    pub batch_size: usize,
    pub enabled: bool,
}

impl Default for FiscalStatusSchedule {
    fn default() -> Self {
        Self {
            cron: constants::DEFAULT_FISCAL_STATUS_CRON.to_string(),
            batch_size: constants::DEFAULT_FISCAL_STATUS_BATCH,
            enabled: true,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: constants::DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            max_reconnect_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: constants::DEFAULT_RECONNECT_DELAY_MS,
            reconnect_max_delay_ms: constants::DEFAULT_RECONNECT_MAX_DELAY_MS,
            job_timeout_secs: constants::DEFAULT_JOB_TIMEOUT_SECS,
            duplicate_create_policy: DuplicateCreatePolicy::default(),
            schedules: default_schedules(),
            fiscal_status: FiscalStatusSchedule::default(),
        }
    }
}

impl SyncConfig {
    pub fn schedule_for(&self, kind: EntityKind) -> Option<&KindSchedule> {
        self.schedules.iter().find(|schedule| schedule.kind == kind)
    }
}

/// Fiscal documents reconcile every five minutes, third parties and
/// journals hourly, the product catalog nightly.
pub fn default_schedules() -> Vec<KindSchedule> {
    const EVERY_FIVE_MINUTES: &str = "0 */5 * * * *";
    const HOURLY: &str = "0 0 * * * *";
    const NIGHTLY: &str = "0 0 2 * * *";

    EntityKind::ALL
        .into_iter()
        .map(|kind| {
            let (cron, batch_size) = match kind {
                EntityKind::Invoice | EntityKind::PaymentReceipt | EntityKind::CreditNote => {
                    (EVERY_FIVE_MINUTES, 20)
                }
                EntityKind::JournalEntry => (HOURLY, 20),
                EntityKind::Customer | EntityKind::Supplier => (HOURLY, 50),
                EntityKind::Product => (NIGHTLY, 50),
            };
            KindSchedule { kind, cron: cron.to_string(), batch_size, enabled: true }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

const fn default_pool_size() -> u32 {
    constants::DEFAULT_POOL_SIZE
}

const fn default_true() -> bool {
    true
}
