//! Remote accounting service integration
//!
//! - [`HttpAccountingClient`]: reqwest adapter behind the `AccountingApi` port
//! - [`SessionHealthMonitor`]: periodic check with transition notifications

pub mod client;
pub mod health;

pub use client::HttpAccountingClient;
pub use health::{HealthStatusListener, LoggingHealthListener, SessionHealthMonitor};
