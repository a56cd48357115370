//! Error types used throughout the synchronization engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for CliniSync
///
/// `Clone` is required: a single in-flight sign-in shares its outcome with
/// every caller that awaited it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum CliniSyncError {
    /// No credentials are stored for the remote accounting service.
    #[error("Accounting credentials not configured: {0}")]
    ConfigMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote rejected the stored credentials or the session token.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The remote client could not be constructed.
    #[error("Remote client unavailable: {0}")]
    SdkUnavailable(String),

    #[error("Reconnect exhausted after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    /// The session is known to be down and no connect was attempted.
    #[error("Remote session is disconnected")]
    Disconnected,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Structured validation error returned by the remote.
    #[error("Remote rejected request ({status}) [{}]: {detail}", .code.as_deref().unwrap_or("unknown"))]
    RemoteRejected { status: u16, code: Option<String>, detail: String },

    /// Transport failure or deadline expiry. The message is stored verbatim
    /// in the sync ledger, so it stays short (`"timeout"`).
    #[error("{0}")]
    NetworkOrTimeout(String),

    /// A previous create may have reached the remote; retrying could
    /// duplicate the remote object.
    #[error("Duplicate create risk: {0}")]
    DuplicateCreateRisk(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliniSyncError {
    /// Shorthand for the deadline-expired transport failure.
    pub fn timeout() -> Self {
        Self::NetworkOrTimeout("timeout".to_string())
    }

    /// Session-level failures: the remote is unreachable or unauthenticated,
    /// which says nothing about the entity being synchronized.
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::ConfigMissing(_)
                | Self::AuthRejected(_)
                | Self::SdkUnavailable(_)
                | Self::ReconnectExhausted { .. }
                | Self::Disconnected
        )
    }

    /// Failures worth retrying on a later run without operator action.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkOrTimeout(_) | Self::Database(_) | Self::Disconnected)
    }

    /// Stable short code used in audit rows when the remote supplied none.
    pub const fn kind_code(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::Config(_) => "config",
            Self::AuthRejected(_) => "auth_rejected",
            Self::SdkUnavailable(_) => "sdk_unavailable",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
            Self::Disconnected => "disconnected",
            Self::NotFound(_) => "not_found",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::NetworkOrTimeout(_) => "network_or_timeout",
            Self::DuplicateCreateRisk(_) => "duplicate_create_risk",
            Self::Database(_) => "database",
            Self::InvalidInput(_) => "invalid_input",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for CliniSync operations
pub type Result<T> = std::result::Result<T, CliniSyncError>;
