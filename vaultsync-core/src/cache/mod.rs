//! Durable per-owner local cache of the decrypted vault snapshot.
//!
//! The cache is the local source of truth: it is written on every
//! mutation and never overwritten from the remote once it holds data for
//! an owner. Each implementation must make `save` atomic per owner, so a
//! crash leaves either the old or the new snapshot.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::vault::VaultSnapshot;
use crate::{Result, VaultSyncError};
use std::collections::HashSet;
use std::sync::Mutex;

/// Per-owner snapshot persistence
///
/// `load` returns `Err(Integrity)` for data that exists but cannot be
/// trusted; callers decide whether to treat that as an empty cache.
pub trait LocalCache: Send + Sync {
    fn load(&self, owner_id: &str) -> Result<Option<VaultSnapshot>>;

    /// Replace the owner's snapshot atomically
    fn save(&self, snapshot: &VaultSnapshot) -> Result<()>;

    fn clear(&self, owner_id: &str) -> Result<()>;

    /// Mark an owner namespace as in use by a live session
    ///
    /// Fails with `AlreadyOpen` if another session holds it.
    fn claim(&self, owner_id: &str) -> Result<()>;

    fn release(&self, owner_id: &str);
}

/// Set of owners with a live session
#[derive(Debug, Default)]
pub(crate) struct Claims(Mutex<HashSet<String>>);

impl Claims {
    pub(crate) fn claim(&self, owner_id: &str) -> Result<()> {
        let mut owners = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !owners.insert(owner_id.to_string()) {
            return Err(VaultSyncError::AlreadyOpen(owner_id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn release(&self, owner_id: &str) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(owner_id);
    }
}

// Shared decoding for stored snapshot text
pub(crate) fn decode_snapshot(owner_id: &str, raw: &str) -> Result<VaultSnapshot> {
    let snapshot: VaultSnapshot = serde_json::from_str(raw)
        .map_err(|e| VaultSyncError::Integrity(format!("unreadable snapshot: {}", e)))?;
    if snapshot.owner_id() != owner_id {
        return Err(VaultSyncError::Integrity(format!(
            "snapshot stored for {} belongs to {}",
            owner_id,
            snapshot.owner_id()
        )));
    }
    snapshot.check_integrity()?;
    Ok(snapshot)
}
