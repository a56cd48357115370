//! Passphrase-based sealing of small secrets (remote API credentials).
//!
//! Each sealed value is a base64 envelope:
//!
//! ```text
//! version (1) | salt (16) | nonce (12) | AES-256-GCM ciphertext + tag
//! ```
//!
//! The key is derived per envelope from the passphrase and the envelope's
//! salt with Argon2, so two seals of the same plaintext never match.
//!
//! ```rust
//! use clinisync_common::crypto::CredentialCipher;
//!
//! let cipher = CredentialCipher::new("correct horse battery staple")?;
//! let sealed = cipher.seal("access-key-123")?;
//! assert_eq!(cipher.open(&sealed)?, "access-key-123");
//! # Ok::<(), clinisync_common::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{CommonError, CommonResult};

const ENVELOPE_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;
const MIN_PASSPHRASE_LEN: usize = 8;

/// Seals and opens secrets with a key derived from a passphrase.
pub struct CredentialCipher {
    passphrase: Vec<u8>,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").field("fingerprint", &self.fingerprint()).finish()
    }
}

impl CredentialCipher {
    /// # Errors
    /// Returns [`CommonError::InvalidKey`] for passphrases shorter than 8
    /// bytes.
    pub fn new(passphrase: &str) -> CommonResult<Self> {
        if passphrase.len() < MIN_PASSPHRASE_LEN {
            return Err(CommonError::InvalidKey(format!(
                "passphrase must be at least {MIN_PASSPHRASE_LEN} bytes"
            )));
        }
        Ok(Self { passphrase: passphrase.as_bytes().to_vec() })
    }

    /// Encrypt `plaintext` into a base64 envelope.
    pub fn seal(&self, plaintext: &str) -> CommonResult<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = self.derive(&salt)?;
        let ciphertext = cipher
            .encrypt(&Nonce::from(nonce), plaintext.as_bytes())
            .map_err(|e| CommonError::Encryption(e.to_string()))?;

        let mut envelope = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        envelope.push(ENVELOPE_VERSION);
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope produced by [`seal`](Self::seal).
    pub fn open(&self, sealed: &str) -> CommonResult<String> {
        let envelope = BASE64
            .decode(sealed.trim())
            .map_err(|e| CommonError::Decryption(format!("invalid base64: {e}")))?;

        if envelope.len() <= HEADER_LEN {
            return Err(CommonError::Decryption("envelope too short".to_string()));
        }
        if envelope[0] != ENVELOPE_VERSION {
            return Err(CommonError::Decryption(format!(
                "unsupported envelope version {}",
                envelope[0]
            )));
        }

        let (salt, rest) = envelope[1..].split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CommonError::Decryption("nonce must be 12 bytes".to_string()))?;

        let plaintext = self
            .derive(salt)?
            .decrypt(&Nonce::from(nonce), ciphertext)
            .map_err(|_| CommonError::Decryption("wrong key or corrupted data".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CommonError::Decryption(format!("plaintext is not UTF-8: {e}")))
    }

    /// Short, non-reversible identifier of the passphrase, stored next to
    /// sealed values to detect a changed key before attempting decryption.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.passphrase);
        BASE64.encode(&digest[..8])
    }

    fn derive(&self, salt: &[u8]) -> CommonResult<Aes256Gcm> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(&self.passphrase, salt, &mut key)
            .map_err(|e| CommonError::InvalidKey(format!("key derivation failed: {e}")))?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| CommonError::InvalidKey(e.to_string()))
    }
}
