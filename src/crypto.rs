//! Shared-session-key encryption helper.
//!
//! The server holds exactly one 32-byte AES-256-GCM key per process,
//! loaded from the key file if present and generated plus persisted
//! otherwise. Every client receives the key string on successful login
//! or registration and encrypts message content with it end to end;
//! the server treats that content as opaque.

use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

/// Returned in place of plaintext when a token fails authentication.
pub const DECRYPT_SENTINEL: &str = "[Decryption Error]";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read or write the key file: {0}")]
    Io(#[from] std::io::Error),
    #[error("key file does not contain a valid base64 256-bit key")]
    Malformed,
}

pub struct SessionCrypto {
    key: [u8; 32],
    key_string: String,
}

impl SessionCrypto {
    /// Load the key from `path`, or generate a new one and persist it.
    pub fn load_or_generate(path: &Path) -> Result<Self, KeyError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            Self::from_key_string(text.trim())
        } else {
            let key: [u8; 32] = rand::random();
            let key_string = B64.encode(key);
            std::fs::write(path, &key_string)?;
            Ok(Self { key, key_string })
        }
    }

    /// Build from a transmitted key string, as a client would.
    pub fn from_key_string(s: &str) -> Result<Self, KeyError> {
        let bytes = B64.decode(s).map_err(|_| KeyError::Malformed)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| KeyError::Malformed)?;
        Ok(Self {
            key,
            key_string: s.to_string(),
        })
    }

    /// The key as transmitted to clients on login/registration.
    pub fn key_string(&self) -> &str {
        &self.key_string
    }

    /// Encrypt plaintext into a transport token: base64(nonce || ct).
    /// Empty input maps to the empty token.
    pub fn encrypt(&self, plaintext: &str) -> String {
        if plaintext.is_empty() {
            return String::new();
        }
        let cipher = Aes256Gcm::new((&self.key).into());
        let nonce_bytes: [u8; 12] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        match cipher.encrypt(nonce, plaintext.as_bytes()) {
            Ok(ct) => {
                let mut combined = Vec::with_capacity(12 + ct.len());
                combined.extend_from_slice(&nonce_bytes);
                combined.extend_from_slice(&ct);
                B64.encode(combined)
            }
            Err(_) => String::new(),
        }
    }

    /// Decrypt a token. Empty input maps to the empty string; any token
    /// not produced by [`encrypt`](Self::encrypt) under this key yields
    /// [`DECRYPT_SENTINEL`] rather than an error.
    pub fn decrypt(&self, token: &str) -> String {
        if token.is_empty() {
            return String::new();
        }
        let combined = match B64.decode(token) {
            Ok(c) if c.len() > 12 => c,
            _ => return DECRYPT_SENTINEL.to_string(),
        };
        let cipher = Aes256Gcm::new((&self.key).into());
        let nonce = Nonce::from_slice(&combined[..12]);
        match cipher.decrypt(nonce, &combined[12..]) {
            Ok(pt) => String::from_utf8(pt).unwrap_or_else(|_| DECRYPT_SENTINEL.to_string()),
            Err(_) => DECRYPT_SENTINEL.to_string(),
        }
    }
}
