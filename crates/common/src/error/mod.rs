//! Error type for the shared utilities.
//!
//! Callers convert [`CommonError`] into their own error enums; nothing in
//! this crate knows about the sync engine's taxonomy.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Key material or passphrase is unusable.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Ciphertext is malformed, truncated or was sealed with another key.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for shared utilities
pub type CommonResult<T> = Result<T, CommonError>;
