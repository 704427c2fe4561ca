//! Plaintext payload encrypted into every remote blob.
//!
//! Shape (kept stable for backward compatibility):
//! `{"entries": [PasswordEntry...], "metadata": {"version": "1.0", "lastModified": <ms>}}`

use crate::storage::BlobId;
use crate::vault::{PasswordEntry, VaultSnapshot};
use crate::{Result, VaultSyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Current payload format version
pub const PAYLOAD_VERSION: &str = "1.0";

/// Decrypted blob contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPayload {
    pub entries: Vec<PasswordEntry>,
    pub metadata: PayloadMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadMetadata {
    pub version: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified: DateTime<Utc>,
}

impl VaultPayload {
    /// Capture the current state of a snapshot
    pub fn from_snapshot(snapshot: &VaultSnapshot) -> Self {
        Self {
            entries: snapshot.entries().to_vec(),
            metadata: PayloadMetadata {
                version: PAYLOAD_VERSION.to_string(),
                last_modified: snapshot.updated_at(),
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse decrypted bytes, accepting any 1.x version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let payload: Self = serde_json::from_slice(bytes)?;
        if !payload.metadata.version.starts_with("1.") {
            return Err(VaultSyncError::Serialization(format!(
                "unsupported payload version {}",
                payload.metadata.version
            )));
        }
        Ok(payload)
    }

    /// Rebuild a full snapshot for `owner_id` from a restored blob
    pub fn into_snapshot(
        self,
        owner_id: &str,
        blob_id: BlobId,
        created_at: DateTime<Utc>,
    ) -> Result<VaultSnapshot> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        if let Some(dup) = self.entries.iter().find(|e| !seen.insert(e.id)) {
            return Err(VaultSyncError::Serialization(format!(
                "duplicate entry id {} in remote payload",
                dup.id
            )));
        }

        let updated_at = self.metadata.last_modified;
        Ok(VaultSnapshot::from_parts(
            owner_id.to_string(),
            self.entries,
            created_at.min(updated_at),
            updated_at,
            Some(blob_id),
        ))
    }
}
