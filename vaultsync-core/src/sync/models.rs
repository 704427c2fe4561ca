//! Sync state reported to the UI collaborator.

use crate::storage::BlobId;
use crate::VaultSyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the sync state machine.
///
/// `Idle -> Syncing -> (Committed | Failed) -> Idle`; the settled phases
/// fall back to `Idle` on the next local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Idle,
    Syncing,
    Committed,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }
}

/// Why the last sync attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&VaultSyncError> for SyncFailure {
    fn from(e: &VaultSyncError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// Snapshot of the session's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Local changes not yet published
    pub pending: bool,
    pub last_blob_id: Option<BlobId>,
    pub last_error: Option<SyncFailure>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// How a session obtained its initial snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The local cache already held a snapshot; the remote was not consulted
    Local,
    /// The cache was empty and the published blob was restored
    Restored { blob_id: BlobId },
    /// Nothing published yet; a fresh empty snapshot was created
    ///
    /// It reaches the cache with the first mutation or `create_vault`.
    Created,
    /// Restoring the published blob failed
    ///
    /// The session runs on an empty snapshot that is not written to the
    /// cache until the first mutation, so the next open retries the restore.
    RestoreFailed { error: SyncFailure },
}
