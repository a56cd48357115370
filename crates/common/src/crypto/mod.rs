//! Cryptographic primitives for secrets kept at rest.

pub mod cipher;

pub use cipher::CredentialCipher;
