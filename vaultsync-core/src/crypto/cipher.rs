//! AES-256-GCM encryption and decryption for vault snapshots.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key derived per blob via PBKDF2 (fresh 32-byte salt)
//! - 96-bit (12 byte) IV, fresh for every encryption
//! - 128-bit authentication tag appended to the ciphertext
//!
//! The wire form is a JSON object `{ciphertext, iv, salt}` with each
//! field encoded as standard base64.

use crate::crypto::kdf::{derive_key, KdfParams, VaultKey, SALT_LEN};
use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// IV (nonce) length in bytes
pub const IV_LEN: usize = 12;

/// Authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// An encrypted snapshot as stored in the remote blob store
///
/// `ciphertext` carries the auth tag in its last 16 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,
}

impl EncryptedBlob {
    /// Serialize to the JSON wire shape
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CryptoError::MalformedBlob(e.to_string()))
    }

    /// Parse the JSON wire shape
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::MalformedBlob(e.to_string()))
    }

    fn salt_array(&self) -> Result<[u8; SALT_LEN]> {
        self.salt
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSaltLength {
                expected: SALT_LEN,
                got: self.salt.len(),
            })
    }

    fn iv_array(&self) -> Result<[u8; IV_LEN]> {
        self.iv.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidNonce(format!("expected {} bytes, got {}", IV_LEN, self.iv.len()))
        })
    }
}

/// Password-based snapshot codec
///
/// Stateless apart from the KDF parameters; cheap to copy into
/// blocking tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultCodec {
    params: KdfParams,
}

impl VaultCodec {
    /// Create a codec, rejecting out-of-range KDF parameters
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Create a codec with a custom PBKDF2 iteration count
    pub fn with_iterations(iterations: u32) -> Result<Self> {
        Self::new(KdfParams::with_iterations(iterations))
    }

    /// KDF parameters in use
    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Derive the symmetric key for a password and salt
    pub fn derive_key(&self, password: &str, salt: &[u8; SALT_LEN]) -> Result<VaultKey> {
        derive_key(password.as_bytes(), salt, &self.params)
    }

    /// Encrypt plaintext under a key derived from `password`
    ///
    /// Every call draws a new salt and a new IV, so two encryptions of
    /// the same snapshot never share key material or nonce.
    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<EncryptedBlob> {
        if plaintext.is_empty() {
            return Err(CryptoError::EncryptionFailed(
                "Cannot encrypt empty data".to_string(),
            ));
        }

        let salt: [u8; SALT_LEN] = rand::random();
        let key = self.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new(key.as_bytes().into());

        let iv = Aes256Gcm::generate_nonce(&mut OsRng);

        // aes-gcm appends the tag: ciphertext || tag
        let ciphertext = cipher
            .encrypt(&iv, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;

        Ok(EncryptedBlob {
            ciphertext,
            iv: iv.to_vec(),
            salt: salt.to_vec(),
        })
    }

    /// Decrypt a blob and verify its authentication tag
    ///
    /// # Security
    /// - A wrong password or any modified byte in `ciphertext`, `iv` or
    ///   `salt` fails with `AuthenticationFailed`; altered plaintext is
    ///   never returned.
    pub fn decrypt(&self, blob: &EncryptedBlob, password: &str) -> Result<Vec<u8>> {
        let salt = blob.salt_array()?;
        let iv = blob.iv_array()?;

        if blob.ciphertext.len() < TAG_LEN {
            return Err(CryptoError::AuthenticationFailed);
        }

        let key = self.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        let nonce = Nonce::from(iv);

        cipher
            .decrypt(&nonce, blob.ciphertext.as_slice())
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// SHA-256 of a string
///
/// Used for non-secret fingerprints only, never on the key path.
pub fn hash(data: &str) -> [u8; 32] {
    Sha256::digest(data.as_bytes()).into()
}

/// Lowercase hex SHA-256 fingerprint of a string
pub fn fingerprint(data: &str) -> String {
    hex::encode(hash(data))
}

/// Custom base64 serialization for `Vec<u8>`.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> VaultCodec {
        VaultCodec::with_iterations(1_000).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = codec();
        let plaintext = br#"{"entries":[],"metadata":{"version":"1.0","lastModified":0}}"#;

        let blob = codec.encrypt(plaintext, "master").unwrap();
        let decrypted = codec.decrypt(&blob, "master").unwrap();

        assert_eq!(plaintext.to_vec(), decrypted);
        assert_eq!(blob.salt.len(), SALT_LEN);
        assert_eq!(blob.iv.len(), IV_LEN);
        assert_eq!(blob.ciphertext.len(), plaintext.len() + TAG_LEN);
    }

    #[test]
    fn test_fresh_salt_and_iv_per_call() {
        let codec = codec();
        let plaintext = b"Same data";

        let blob1 = codec.encrypt(plaintext, "master").unwrap();
        let blob2 = codec.encrypt(plaintext, "master").unwrap();

        assert_ne!(blob1.salt, blob2.salt);
        assert_ne!(blob1.iv, blob2.iv);
        assert_ne!(blob1.ciphertext, blob2.ciphertext);

        assert_eq!(
            codec.decrypt(&blob1, "master").unwrap(),
            codec.decrypt(&blob2, "master").unwrap()
        );
    }

    #[test]
    fn test_wrong_password_fails() {
        let codec = codec();
        let blob = codec.encrypt(b"Secret data", "master").unwrap();

        assert!(matches!(
            codec.decrypt(&blob, "wrong-password"),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let codec = codec();
        let blob = codec.encrypt(b"Original data", "master").unwrap();

        for byte in 0..blob.ciphertext.len() {
            let mut tampered = blob.clone();
            tampered.ciphertext[byte] ^= 0x01;
            assert!(matches!(
                codec.decrypt(&tampered, "master"),
                Err(CryptoError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn test_tampered_salt_detected() {
        let codec = codec();
        let blob = codec.encrypt(b"Original data", "master").unwrap();

        for bit in [0usize, 7, 100, 255] {
            let mut tampered = blob.clone();
            tampered.salt[bit / 8] ^= 1 << (bit % 8);
            assert!(matches!(
                codec.decrypt(&tampered, "master"),
                Err(CryptoError::AuthenticationFailed)
            ));
        }
    }

    #[test]
    fn test_tampered_iv_detected() {
        let codec = codec();
        let mut blob = codec.encrypt(b"Original data", "master").unwrap();
        blob.iv[0] ^= 0xFF;

        assert!(matches!(
            codec.decrypt(&blob, "master"),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let codec = codec();
        let mut blob = codec.encrypt(b"Original data", "master").unwrap();
        blob.ciphertext.truncate(TAG_LEN - 1);

        assert!(matches!(
            codec.decrypt(&blob, "master"),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_bad_lengths_rejected() {
        let codec = codec();
        let blob = codec.encrypt(b"data", "master").unwrap();

        let mut short_salt = blob.clone();
        short_salt.salt.pop();
        assert!(matches!(
            codec.decrypt(&short_salt, "master"),
            Err(CryptoError::InvalidSaltLength { expected: 32, got: 31 })
        ));

        let mut long_iv = blob;
        long_iv.iv.push(0);
        assert!(matches!(
            codec.decrypt(&long_iv, "master"),
            Err(CryptoError::InvalidNonce(_))
        ));
    }

    #[test]
    fn test_empty_data_fails() {
        assert!(codec().encrypt(b"", "master").is_err());
    }

    #[test]
    fn test_wire_shape() {
        let codec = codec();
        let blob = codec.encrypt(b"payload", "master").unwrap();
        let wire = blob.to_wire().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&wire).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        for field in ["ciphertext", "iv", "salt"] {
            assert!(object[field].is_string(), "{} should be base64 text", field);
        }

        let parsed = EncryptedBlob::from_wire(&wire).unwrap();
        assert_eq!(parsed, blob);
        assert_eq!(codec.decrypt(&parsed, "master").unwrap(), b"payload");
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(matches!(
            EncryptedBlob::from_wire(b"not json"),
            Err(CryptoError::MalformedBlob(_))
        ));
        assert!(matches!(
            EncryptedBlob::from_wire(br#"{"ciphertext":"!!","iv":"","salt":""}"#),
            Err(CryptoError::MalformedBlob(_))
        ));
    }

    #[test]
    fn test_hash_and_fingerprint() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash("abc").len(), 32);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
