//! Pointer records: the small owner-scoped record naming an owner's current blob.
//!
//! The record itself lives on an external chain. This module defines the
//! record shape, the update request the client builds, and the two
//! collaborator seams: [`PointerResolver`] reads, [`PointerSubmitter`]
//! signs and submits. [`LocalPointerRegistry`] implements both for local
//! development and tests.

mod registry;

pub use registry::LocalPointerRegistry;

use crate::storage::BlobId;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The current published state for one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerRecord {
    pub owner: String,
    pub blob_id: BlobId,
    pub total_entries: usize,
    pub is_locked: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Proof that the holder may replace an owner's existing record
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Capability(<redacted>)")
    }
}

/// Unsigned request to point an owner's record at a new blob
///
/// Without a capability the request creates the record; it is rejected by
/// the submitter if a record already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointerUpdate {
    pub owner: String,
    pub blob_id: BlobId,
    pub total_entries: usize,
    pub is_locked: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
}

impl PointerUpdate {
    /// Build the update request for a freshly stored blob
    pub fn build(
        owner: &str,
        blob_id: BlobId,
        capability: Option<Capability>,
        total_entries: usize,
        is_locked: bool,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            blob_id,
            total_entries,
            is_locked,
            requested_at: crate::vault::now_millis(),
            capability,
        }
    }

    pub fn creates_record(&self) -> bool {
        self.capability.is_none()
    }
}

/// Confirmation returned once an update lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerReceipt {
    pub record: PointerRecord,
    /// Capability to present on the next update
    pub capability: Capability,
}

/// Reads the current record for an owner
#[async_trait]
pub trait PointerResolver: Send + Sync {
    /// `None` means the owner has never published
    async fn resolve(&self, owner: &str) -> Result<Option<PointerRecord>>;
}

/// Signs and submits update requests
#[async_trait]
pub trait PointerSubmitter: Send + Sync {
    async fn submit(&self, update: PointerUpdate) -> Result<PointerReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_update_without_capability_creates() {
        let update = PointerUpdate::build("0xabc", BlobId::new("b1"), None, 2, false);
        assert!(update.creates_record());
        assert_eq!(update.owner, "0xabc");
        assert_eq!(update.total_entries, 2);

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["blobId"], "b1");
        assert!(json.get("capability").is_none());
    }

    #[test]
    fn build_update_with_capability_replaces() {
        let update = PointerUpdate::build(
            "0xabc",
            BlobId::new("b2"),
            Some(Capability::new("cap-1")),
            0,
            true,
        );
        assert!(!update.creates_record());
        assert!(update.is_locked);
    }

    #[test]
    fn capability_debug_is_redacted() {
        let cap = Capability::new("secret-token");
        assert!(!format!("{:?}", cap).contains("secret-token"));
        assert_eq!(cap.as_str(), "secret-token");
    }
}
