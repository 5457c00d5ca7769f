//! Symmetric-cipher backend (`scr`)
//!
//! Values are sealed with AES-256-GCM. A locator is the base64 encoding
//! (standard alphabet, no padding) of `nonce || ciphertext_with_tag`, so the
//! same plaintext encrypted twice produces different locators.
//!
//! The key is 32 bytes, exchanged as base64. [`CipherBackend::from_env`]
//! reads it from `SCR_PASS` and falls back to a built-in default key, which
//! only obscures values and must not be relied on in production.
//!
//! Locators from older AES-CFB encrypters (16-byte IV prefix) cannot be
//! decrypted here; re-encrypt them with [`encrypt`] or `secret-ref encrypt`.
//!
//! # Example
//!
//! ```
//! use secret_ref::backends::cipher;
//! use secret_ref::backends::{CipherBackend, CIPHER};
//! use secret_ref::{Registry, Secret};
//!
//! let key = cipher::generate_key();
//! let sealed = cipher::encrypt("hunter2", &cipher::decode_key(&key).unwrap()).unwrap();
//!
//! let registry = Registry::with_builtins();
//! registry.register(CIPHER, CipherBackend::from_base64(&key).unwrap());
//!
//! let secret = Secret::parse_with(&registry, &format!("scr:{sealed}"));
//! assert_eq!(secret.get(), "hunter2");
//! ```

use crate::backend::Backend;
use crate::errors::BackendError;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

/// Nonce length prepended to every ciphertext
pub const NONCE_SIZE: usize = 12;

/// Key length in bytes
pub const KEY_SIZE: usize = 32;

/// Key used when none is configured; only obscures values
pub const DEFAULT_KEY: [u8; KEY_SIZE] = [
    9, 190, 70, 76, 8, 173, 169, 87, 168, 51, 8, 167, 66, 188, 73, 189, 90, 66, 153, 50, 2, 185,
    72, 66, 168, 68, 71, 175, 168, 189, 52, 187,
];

fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD_NO_PAD.decode(input.trim().trim_end_matches('='))
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, BackendError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| {
        BackendError::Crypto(format!("key must be {} bytes, got {}", KEY_SIZE, key.len()))
    })
}

/// Generate a new random key, base64 encoded
pub fn generate_key() -> String {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(&mut key[..]);
    STANDARD_NO_PAD.encode(&key[..])
}

/// Decode a base64 key and check its length
pub fn decode_key(encoded: &str) -> Result<Zeroizing<Vec<u8>>, BackendError> {
    let key = Zeroizing::new(
        decode_base64(encoded).map_err(|e| BackendError::Crypto(format!("key decode: {}", e)))?,
    );
    if key.len() != KEY_SIZE {
        return Err(BackendError::Crypto(format!(
            "key must be {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }
    Ok(key)
}

/// Encrypt `plaintext` into a locator usable with the `scr` backend
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String, BackendError> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| BackendError::Crypto(format!("encrypt: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(STANDARD_NO_PAD.encode(out))
}

/// Decrypt a locator produced by [`encrypt`]
pub fn decrypt(locator: &str, key: &[u8]) -> Result<String, BackendError> {
    let cipher = cipher_for(key)?;

    let data = decode_base64(locator)
        .map_err(|e| BackendError::InvalidLocator(format!("ciphertext decode: {}", e)))?;
    if data.len() < NONCE_SIZE {
        return Err(BackendError::InvalidLocator("ciphertext too short".to_string()));
    }

    let (nonce, sealed) = data.split_at(NONCE_SIZE);
    let plain = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                BackendError::Crypto("decryption failed: wrong key or corrupted value".to_string())
            })?,
    );

    String::from_utf8(plain.to_vec())
        .map_err(|_| BackendError::Crypto("decrypted value is not valid UTF-8".to_string()))
}

/// Backend decrypting locators with a fixed key
///
/// Clones share the key and nothing else.
#[derive(Clone)]
pub struct CipherBackend {
    key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for CipherBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherBackend(****)")
    }
}

impl CipherBackend {
    /// Create a backend from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self, BackendError> {
        let _ = cipher_for(key)?;
        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Create a backend from a base64 key
    pub fn from_base64(encoded: &str) -> Result<Self, BackendError> {
        Ok(Self {
            key: decode_key(encoded)?,
        })
    }

    /// Create a backend keyed from `SCR_PASS`, or the built-in default key
    /// when the variable is unset or empty
    pub fn from_env() -> Result<Self, BackendError> {
        match std::env::var(crate::CIPHER_KEY_ENV) {
            Ok(encoded) if !encoded.is_empty() => Self::from_base64(&encoded),
            _ => Ok(Self::with_default_key()),
        }
    }

    /// Create a backend using the built-in default key
    pub fn with_default_key() -> Self {
        Self {
            key: Zeroizing::new(DEFAULT_KEY.to_vec()),
        }
    }
}

impl Backend for CipherBackend {
    fn clone_box(&self) -> Box<dyn Backend> {
        Box::new(self.clone())
    }

    fn resolve(&mut self, locator: &str) -> Result<String, BackendError> {
        if locator.is_empty() {
            return Err(BackendError::InvalidLocator("ciphertext is empty".to_string()));
        }
        decrypt(locator, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_VALUE: &str = "This is the secret key to store in config";

    #[test]
    fn test_encrypt_then_resolve() {
        let key = generate_key();
        let raw_key = decode_key(&key).unwrap();
        let sealed = encrypt(TEST_VALUE, &raw_key).unwrap();

        let mut backend = CipherBackend::from_base64(&key).unwrap();
        assert_eq!(backend.resolve(&sealed).unwrap(), TEST_VALUE);
        assert_eq!(backend.clone_box().resolve(&sealed).unwrap(), TEST_VALUE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = encrypt(TEST_VALUE, &DEFAULT_KEY).unwrap();
        let mut backend = CipherBackend::from_base64(&generate_key()).unwrap();
        assert!(matches!(backend.resolve(&sealed), Err(BackendError::Crypto(_))));

        let mut default = CipherBackend::with_default_key();
        assert_eq!(default.resolve(&sealed).unwrap(), TEST_VALUE);
    }

    #[test]
    fn test_nonce_makes_output_unique() {
        let a = encrypt(TEST_VALUE, &DEFAULT_KEY).unwrap();
        let b = encrypt(TEST_VALUE, &DEFAULT_KEY).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_padded_key_accepted() {
        let key = generate_key();
        let padded = format!("{key}=");
        assert_eq!(*decode_key(&padded).unwrap(), *decode_key(&key).unwrap());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(decode_key("c2hvcnQ"), Err(BackendError::Crypto(_))));
        assert!(matches!(decode_key("not base64!"), Err(BackendError::Crypto(_))));
        assert!(CipherBackend::new(&[1, 2, 3]).is_err());

        let mut backend = CipherBackend::with_default_key();
        assert!(matches!(backend.resolve(""), Err(BackendError::InvalidLocator(_))));
        assert!(matches!(backend.resolve("c2hvcnQ"), Err(BackendError::InvalidLocator(_))));
        assert!(matches!(backend.resolve("@@@"), Err(BackendError::InvalidLocator(_))));
    }

    #[test]
    fn test_cfb_locator_needs_reencryption() {
        // 16-byte IV followed by a stream-cipher body, padded base64
        let mut legacy = vec![7u8; 16];
        legacy.extend_from_slice(b"0123456789");
        let locator = base64::engine::general_purpose::STANDARD.encode(legacy);

        let mut backend = CipherBackend::with_default_key();
        assert!(matches!(backend.resolve(&locator), Err(BackendError::Crypto(_))));
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", CipherBackend::with_default_key()), "CipherBackend(****)");
    }
}
