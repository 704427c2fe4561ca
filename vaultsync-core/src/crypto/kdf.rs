//! PBKDF2-HMAC-SHA256 key derivation for vault encryption keys.
//!
//! Uses PBKDF2 with:
//! - HMAC-SHA256 as the PRF
//! - 100,000 iterations by default (configurable)
//! - Output length: 32 bytes (256 bits, the AES-256 key size)
//! - Salt length: 32 bytes, freshly generated for every encrypted blob

use crate::crypto::{CryptoError, Result};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

/// Salt length in bytes
pub const SALT_LEN: usize = 32;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted by [`KdfParams::validate`]
pub const MIN_ITERATIONS: u32 = 1_000;

/// Parameters for PBKDF2 key derivation
///
/// The salt is not part of the parameters: it travels with every
/// encrypted blob so each blob gets its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of PBKDF2 iterations
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Create parameters with the given iteration count
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.iterations < MIN_ITERATIONS {
            return Err(CryptoError::KdfFailed(format!(
                "Iteration count too low (minimum: {})",
                MIN_ITERATIONS
            )));
        }
        Ok(())
    }
}

/// A 256-bit symmetric key derived from master key material.
///
/// Only ever lives in memory; zeroized on drop.
pub struct VaultKey {
    key: [u8; KEY_LEN],
}

impl VaultKey {
    /// Create a key from raw bytes (use with caution)
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(<redacted>)")
    }
}

/// Derive an encryption key from a password and salt using PBKDF2-HMAC-SHA256
///
/// Deterministic: the same password, salt and parameters always yield
/// the same key.
///
/// # Arguments
/// * `password` - The master key material as bytes
/// * `salt` - 32-byte salt, unique per encrypted blob
/// * `params` - KDF parameters (iteration count)
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN], params: &KdfParams) -> Result<VaultKey> {
    params.validate()?;

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut key);

    let vault_key = VaultKey::from_bytes(key);
    key.zeroize();
    Ok(vault_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams::with_iterations(MIN_ITERATIONS)
    }

    #[test]
    fn test_kdf_params_default() {
        let params = KdfParams::default();
        assert_eq!(params.iterations, 100_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_kdf_params_validation() {
        assert!(KdfParams::with_iterations(999).validate().is_err());
        assert!(KdfParams::with_iterations(0).validate().is_err());
        assert!(KdfParams::with_iterations(MIN_ITERATIONS).validate().is_ok());
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [7u8; SALT_LEN];
        let key1 = derive_key(b"correct horse", &salt, &fast_params()).unwrap();
        let key2 = derive_key(b"correct horse", &salt, &fast_params()).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());

        // Different password should produce different key
        let key3 = derive_key(b"battery staple", &salt, &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key3.as_bytes());

        // Different salt should produce different key
        let key4 = derive_key(b"correct horse", &[8u8; SALT_LEN], &fast_params()).unwrap();
        assert_ne!(key1.as_bytes(), key4.as_bytes());
    }

    #[test]
    fn test_iterations_change_key() {
        let salt = [1u8; SALT_LEN];
        let key1 = derive_key(b"pw", &salt, &KdfParams::with_iterations(1_000)).unwrap();
        let key2 = derive_key(b"pw", &salt, &KdfParams::with_iterations(1_001)).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_matches_raw_pbkdf2() {
        let salt = [0u8; SALT_LEN];
        let key = derive_key(b"password", &salt, &fast_params()).unwrap();
        let mut expected = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(b"password", &salt, MIN_ITERATIONS, &mut expected);
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = VaultKey::from_bytes([0xAB; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "VaultKey(<redacted>)");
    }
}
