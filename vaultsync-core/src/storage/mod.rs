//! Content-addressed remote blob storage.
//!
//! A blob store holds opaque, immutable byte strings addressed by an id
//! the store derives from the content. Storing identical bytes twice yields
//! the same id. Every call makes exactly one attempt; retry policy lives in
//! the sync orchestrator.

mod fs;
mod memory;
mod walrus;

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use walrus::{WalrusClient, WalrusConfig};

use crate::Result;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identifier of an immutable blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive an id from content: URL-safe base64 of its SHA-256 digest
    pub fn for_content(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest))
    }

    /// Non-empty and url-safe base64 only, so it can name a path segment
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote content-addressed store
///
/// Errors are classified so the caller can decide whether to retry:
/// `Timeout` and `Transient` may be retried, `PayloadTooLarge`,
/// `NotFound` and `Remote` may not.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return their id
    ///
    /// A store that reports the content as already present still returns
    /// success with the existing id.
    async fn put(&self, data: &[u8]) -> Result<BlobId>;

    /// Fetch the bytes for an id, or `NotFound`
    async fn get(&self, id: &BlobId) -> Result<Vec<u8>>;

    async fn exists(&self, id: &BlobId) -> Result<bool>;
}
