//! Scheduling infrastructure for automated reconciliation
//!
//! Schedulers own their lifecycle explicitly: `start`/`stop`, tracked join
//! handles, a cancellation token and a timeout around every async step.

pub mod error;
pub mod reconciliation_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use reconciliation_scheduler::{ReconciliationScheduler, ReconciliationSchedulerConfig};
