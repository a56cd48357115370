//! Synchronization with the remote accounting service

pub mod audit;
pub mod executor;
pub mod fiscal;
pub mod mapping;
pub mod ports;
pub mod reconciler;
pub mod response;
pub mod service;
pub mod session;
pub mod synchronizer;

pub use audit::{AuditRecorder, CallTrace};
pub use executor::{CallExecutor, CallIntent, CallOutcome, RemoteCall};
pub use fiscal::{FiscalCheck, FiscalRefreshReport, FiscalStatusRefresher};
pub use ports::*;
pub use reconciler::{Reconciler, RunReport, SkipReason};
pub use service::{EnginePorts, EngineSettings, SyncService, SyncStatus};
pub use session::{SessionManager, SessionSettings, HEALTH_CHECK_PATH};
pub use synchronizer::{EntitySynchronizer, SyncAction, SyncOutcome};
