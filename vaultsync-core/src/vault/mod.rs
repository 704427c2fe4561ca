//! Vault snapshot model - the unit of persistence and encryption

mod entry;
mod payload;
#[cfg(test)]
mod tests;

pub use entry::{normalize_domain, EntryPatch, NewEntry, PasswordEntry};
pub use payload::{PayloadMetadata, VaultPayload, PAYLOAD_VERSION};

use crate::storage::BlobId;
use crate::sync::SyncPhase;
use crate::{Result, VaultSyncError};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// The complete decrypted vault for one owner
///
/// Entries are private so the id-uniqueness and timestamp invariants can
/// only change through the mutation methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSnapshot {
    owner_id: String,
    entries: Vec<PasswordEntry>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub last_synced_blob_id: Option<BlobId>,
    /// `updated_at` of the version last published
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    synced_updated_at: Option<DateTime<Utc>>,
}

impl VaultSnapshot {
    /// Create an empty vault for an owner
    pub fn new(owner_id: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            owner_id: owner_id.into(),
            entries: Vec::new(),
            created_at: now,
            updated_at: now,
            is_locked: false,
            last_synced_blob_id: None,
            synced_updated_at: None,
        }
    }

    pub(crate) fn from_parts(
        owner_id: String,
        entries: Vec<PasswordEntry>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        last_synced_blob_id: Option<BlobId>,
    ) -> Self {
        let synced_updated_at = last_synced_blob_id.as_ref().map(|_| updated_at);
        Self {
            owner_id,
            entries,
            created_at,
            updated_at,
            is_locked: false,
            last_synced_blob_id,
            synced_updated_at,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn entries(&self) -> &[PasswordEntry] {
        &self.entries
    }

    /// Always equal to `entries().len()`
    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether local changes exist that no published blob contains
    pub fn has_unsynced_changes(&self) -> bool {
        self.synced_updated_at != Some(self.updated_at)
    }

    /// Record that the version stamped `published_updated_at` is stored as `blob_id`
    ///
    /// If the snapshot changed after that version was captured it stays
    /// marked as having unsynced changes.
    pub(crate) fn mark_synced(&mut self, blob_id: BlobId, published_updated_at: DateTime<Utc>) {
        self.last_synced_blob_id = Some(blob_id);
        self.synced_updated_at = Some(published_updated_at);
    }

    /// Get an entry by ID
    pub fn get(&self, id: &Uuid) -> Option<&PasswordEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Case-insensitive search over domain, username, category and notes
    ///
    /// An empty query returns every entry.
    pub fn search(&self, query: &str) -> Vec<PasswordEntry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| needle.is_empty() || e.matches(&needle))
            .cloned()
            .collect()
    }

    /// Add a new entry to the vault
    pub fn add(&mut self, input: NewEntry) -> Result<PasswordEntry> {
        self.ensure_unlocked()?;
        let valid = input.validate()?;

        let mut id = Uuid::new_v4();
        while self.get(&id).is_some() {
            id = Uuid::new_v4();
        }

        let now = self.next_timestamp();
        let entry = PasswordEntry::create(id, valid, now);
        self.entries.push(entry.clone());
        self.updated_at = now;
        Ok(entry)
    }

    /// Apply a patch to an existing entry
    pub fn update(&mut self, id: &Uuid, patch: EntryPatch) -> Result<PasswordEntry> {
        self.ensure_unlocked()?;
        let now = self.next_timestamp();
        let entry = self.entry_mut(id)?;
        patch.apply(entry, now)?;
        let updated = entry.clone();
        self.updated_at = now;
        Ok(updated)
    }

    /// Remove an entry, returning it
    pub fn delete(&mut self, id: &Uuid) -> Result<PasswordEntry> {
        self.ensure_unlocked()?;
        let index = self
            .entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| VaultSyncError::NotFound(format!("Entry {}", id)))?;
        let removed = self.entries.remove(index);
        self.updated_at = self.next_timestamp();
        Ok(removed)
    }

    /// Record that an entry was used (autofill, copy)
    ///
    /// The only operation that increments `usage_count`.
    pub fn record_usage(&mut self, id: &Uuid) -> Result<PasswordEntry> {
        self.ensure_unlocked()?;
        let now = self.next_timestamp();
        let entry = self.entry_mut(id)?;
        entry.usage_count += 1;
        entry.last_used = Some(now);
        let used = entry.clone();
        self.updated_at = now;
        Ok(used)
    }

    /// Check the structural invariants of a snapshot read from storage
    pub fn check_integrity(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !seen.insert(entry.id) {
                return Err(VaultSyncError::Integrity(format!(
                    "duplicate entry id {}",
                    entry.id
                )));
            }
        }
        if self.updated_at < self.created_at {
            return Err(VaultSyncError::Integrity(
                "updatedAt precedes createdAt".to_string(),
            ));
        }
        Ok(())
    }

    fn entry_mut(&mut self, id: &Uuid) -> Result<&mut PasswordEntry> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| VaultSyncError::NotFound(format!("Entry {}", id)))
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked {
            return Err(VaultSyncError::VaultLocked);
        }
        Ok(())
    }

    // updatedAt strictly increases, even when two mutations land in the same millisecond
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = now_millis();
        let floor = self.updated_at + Duration::milliseconds(1);
        now.max(floor)
    }
}

/// Summary shown to the UI collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultInfo {
    pub total_entries: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub is_locked: bool,
    pub last_synced_blob_id: Option<BlobId>,
    pub sync_phase: SyncPhase,
}

// Millisecond precision keeps timestamps stable across the JSON round trip.
pub(crate) fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
