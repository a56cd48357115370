//! Shared HTTP transport with method-aware retries

pub mod client;

pub use client::{HttpClient, HttpClientBuilder, RetryPolicy};
