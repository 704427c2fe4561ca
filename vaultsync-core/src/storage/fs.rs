//! Directory-backed blob store for local development.
//!
//! Each blob is one file named by its content id. Writes go to a hidden
//! temporary file that is synced and then renamed into place, so readers
//! see either no blob or the whole blob.

use super::{BlobId, BlobStore};
use crate::{Result, VaultSyncError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    directory: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `directory`, creating it if needed
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, id: &BlobId) -> Result<PathBuf> {
        // Ids are url-safe base64, so anything else cannot name a blob here
        if !id.is_well_formed() {
            return Err(VaultSyncError::NotFound(format!("Blob {}", id)));
        }
        Ok(self.directory.join(id.as_str()))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, data: &[u8]) -> Result<BlobId> {
        let id = BlobId::for_content(data);
        let path = self.blob_path(&id)?;
        if tokio::fs::try_exists(&path).await? {
            debug!("Blob {} already stored", id);
            return Ok(id);
        }

        let temp = self
            .directory
            .join(format!(".{}.{}.tmp", id, uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Vec<u8>> {
        let path = self.blob_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultSyncError::NotFound(format!("Blob {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &BlobId) -> Result<bool> {
        match self.blob_path(id) {
            Ok(path) => Ok(tokio::fs::try_exists(&path).await?),
            Err(_) => Ok(false),
        }
    }
}
