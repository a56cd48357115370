//! # CliniSync Core
//!
//! Sync engine logic with no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the remote API, the ledger, the audit log and the
//!   primary store
//! - Session management, call execution and per-kind payload mapping
//! - The entity synchronizer, batch reconciler and [`SyncService`]
//!
//! Adapters live in `clinisync-infra`.

pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use sync::ports::{AccountingApi, AuditLog, CredentialStore, EntityStore, SyncLedger};
pub use sync::{
    EnginePorts, EngineSettings, FiscalCheck, FiscalRefreshReport, Reconciler, RunReport,
    SessionManager, SyncAction, SyncOutcome, SyncService, SyncStatus,
};
