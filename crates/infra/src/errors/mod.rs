//! Error conversion glue between external crates and [`CliniSyncError`].
//!
//! [`CliniSyncError`]: clinisync_domain::CliniSyncError

mod conversions;

pub use conversions::InfraError;
pub(crate) use conversions::looks_like_wrong_key;
