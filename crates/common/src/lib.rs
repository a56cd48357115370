//! Shared utilities for the CliniSync crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: errors, payload redaction, backoff policies
//! - `runtime`: credential encryption (AES-256-GCM with Argon2 key
//!   derivation)

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod privacy;
#[cfg(feature = "foundation")]
pub mod resilience;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod crypto;

#[cfg(feature = "runtime")]
pub use crypto::CredentialCipher;
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult};
#[cfg(feature = "foundation")]
pub use privacy::Redactor;
#[cfg(feature = "foundation")]
pub use resilience::BackoffStrategy;
