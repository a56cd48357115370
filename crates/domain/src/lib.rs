//! # CliniSync Domain
//!
//! Data types shared by the accounting synchronization engine.
//!
//! This crate contains:
//! - Entity kinds, sync ledger records and audit entries
//! - Snapshots of the local entities that get synchronized
//! - Domain error types and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - No dependencies on other CliniSync crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
