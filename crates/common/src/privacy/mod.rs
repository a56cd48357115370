//! Secret redaction for payloads that get persisted or logged.

pub mod redaction;

pub use redaction::Redactor;
