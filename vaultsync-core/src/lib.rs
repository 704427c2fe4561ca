//! Encrypted Vault Synchronization Engine
//!
//! Keeps a password-entry vault consistent across three tiers:
//! a durable local cache, a content-addressed remote blob store, and a
//! chain-held pointer record naming the owner's current blob. The remote
//! copy is only ever stored encrypted under a key derived from
//! client-held master key material.

pub mod cache;
pub mod crypto;
pub mod identity;
pub mod platform;
pub mod pointer;
pub mod storage;
pub mod sync;
pub mod vault;

pub use cache::{LocalCache, MemoryCache, SqliteCache};
pub use crypto::{fingerprint, CryptoError, EncryptedBlob, MasterSecret, VaultCodec};
pub use identity::{IdentityProvider, StaticIdentity};
pub use pointer::{
    Capability, LocalPointerRegistry, PointerReceipt, PointerRecord, PointerResolver,
    PointerSubmitter, PointerUpdate,
};
pub use storage::{BlobId, BlobStore, FsBlobStore, MemoryBlobStore, WalrusClient, WalrusConfig};
pub use sync::{
    BootstrapOutcome, SyncBackends, SyncConfig, SyncFailure, SyncPhase, SyncStatus, VaultSession,
};
pub use vault::{EntryPatch, NewEntry, PasswordEntry, VaultInfo, VaultSnapshot};

use thiserror::Error;

/// Result type for vault sync operations
pub type Result<T> = std::result::Result<T, VaultSyncError>;

/// General error type for vault sync operations
#[derive(Error, Debug)]
pub enum VaultSyncError {
    #[error("Invalid entry: {0}")]
    Validation(String),

    #[error("Authentication failed - wrong master key or corrupted blob")]
    AuthenticationFailed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Payload too large: {size} bytes")]
    PayloadTooLarge { size: usize },

    #[error("Local cache integrity error: {0}")]
    Integrity(String),

    #[error("Vault is locked")]
    VaultLocked,

    #[error("A session for owner {0} is already open")]
    AlreadyOpen(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultSyncError {
    /// Whether the sync pipeline may retry the failed step
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }

    /// Short stable name of the error kind, used in sync status reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Transient(_) => "transient",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Integrity(_) => "integrity",
            Self::VaultLocked => "vault_locked",
            Self::AlreadyOpen(_) => "already_open",
            Self::Capability(_) => "capability",
            Self::Remote(_) => "remote",
            Self::Storage(_) => "storage",
            Self::Serialization(_) => "serialization",
            Self::Crypto(_) => "crypto",
            Self::Io(_) => "io",
        }
    }
}

impl From<CryptoError> for VaultSyncError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed => Self::AuthenticationFailed,
            other => Self::Crypto(other),
        }
    }
}

impl From<rusqlite::Error> for VaultSyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultSyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
