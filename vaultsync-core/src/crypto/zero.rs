//! Zeroizing container for master key material.
//!
//! The identity provider hands over a password-equivalent secret; it is
//! kept in a [`MasterSecret`] so it is wiped when the last copy drops.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Master key material used to derive per-blob encryption keys
///
/// `Debug` output never contains the secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    secret: String,
}

impl MasterSecret {
    /// Wrap a secret string
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Borrow the secret (use carefully!)
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Length of the secret in bytes
    pub fn len(&self) -> usize {
        self.secret.len()
    }

    /// Check if the secret is empty
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }
}

impl From<String> for MasterSecret {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MasterSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterSecret(<redacted>)")
    }
}
