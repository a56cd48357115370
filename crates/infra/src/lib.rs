//! # CliniSync Infrastructure
//!
//! Infrastructure implementations of the core sync ports.
//!
//! This crate contains:
//! - Database implementations (SQLite/SQLCipher) of the sync ledger, audit
//!   log and credential store
//! - The HTTP client for the remote accounting API
//! - Background services: reconciliation scheduler, session health monitor
//!   and on-demand sync queue
//! - Configuration loading, tracing setup and runtime wiring
//!
//! ## Architecture
//! - Implements traits defined in `clinisync-core`
//! - Depends on `clinisync-common`, `clinisync-domain` and `clinisync-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod runtime;
pub mod scheduling;
pub mod sync;

pub use database::*;
pub use errors::InfraError;
pub use http::*;
pub use integrations::accounting::{
    HealthStatusListener, HttpAccountingClient, LoggingHealthListener, SessionHealthMonitor,
};
pub use runtime::SyncRuntime;
