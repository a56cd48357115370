//! Background sync services that sit outside the scheduler.

pub mod on_demand_queue;

pub use on_demand_queue::{OnDemandQueueConfig, OnDemandSyncQueue, SyncFailure};
