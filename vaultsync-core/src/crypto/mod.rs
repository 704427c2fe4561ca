//! Cryptographic primitives for vault snapshots.
//!
//! This module provides:
//! - PBKDF2-HMAC-SHA256 key derivation
//! - AES-256-GCM encryption/decryption of whole snapshots
//! - SHA-256 fingerprints for breach/reuse detection
//! - Zeroizing containers for key material

pub mod cipher;
pub mod kdf;
pub mod zero;

pub use cipher::{fingerprint, hash, EncryptedBlob, VaultCodec, IV_LEN, TAG_LEN};
pub use kdf::{derive_key, KdfParams, VaultKey, DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN};
pub use zero::MasterSecret;

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid salt length: expected {expected}, got {got}")]
    InvalidSaltLength { expected: usize, got: usize },

    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    #[error("Authentication failed - wrong key or data has been tampered with")]
    AuthenticationFailed,

    #[error("Malformed encrypted blob: {0}")]
    MalformedBlob(String),
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
