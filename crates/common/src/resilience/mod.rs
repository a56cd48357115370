//! Retry timing policies.

pub mod backoff;

pub use backoff::BackoffStrategy;
