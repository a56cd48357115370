//! External service integrations

pub mod accounting;
