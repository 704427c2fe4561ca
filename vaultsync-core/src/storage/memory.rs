//! In-memory blob store for tests and embedding.

use super::{BlobId, BlobStore};
use crate::{Result, VaultSyncError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Content-addressed store kept in a `HashMap`
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<BlobId, Vec<u8>>>,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    max_blob_size: Option<usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject payloads above `max` bytes with `PayloadTooLarge`
    pub fn with_size_limit(max: usize) -> Self {
        Self {
            max_blob_size: Some(max),
            ..Self::default()
        }
    }

    /// Number of `put` calls that reached the store, including duplicates
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Number of `get` calls, including misses
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite stored bytes in place, simulating remote corruption
    pub fn tamper(&self, id: &BlobId, data: Vec<u8>) {
        self.lock().insert(id.clone(), data);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BlobId, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, data: &[u8]) -> Result<BlobId> {
        if let Some(max) = self.max_blob_size {
            if data.len() > max {
                return Err(VaultSyncError::PayloadTooLarge { size: data.len() });
            }
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let id = BlobId::for_content(data);
        self.lock().entry(id.clone()).or_insert_with(|| data.to_vec());
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultSyncError::NotFound(format!("Blob {}", id)))
    }

    async fn exists(&self, id: &BlobId) -> Result<bool> {
        Ok(self.lock().contains_key(id))
    }
}
