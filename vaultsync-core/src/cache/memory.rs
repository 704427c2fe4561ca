//! In-memory snapshot cache for tests and embedding.

use super::{decode_snapshot, Claims, LocalCache};
use crate::vault::VaultSnapshot;
use crate::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory cache holding serialized snapshots
#[derive(Debug, Default)]
pub struct MemoryCache {
    snapshots: Mutex<HashMap<String, String>>,
    claims: Claims,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text for an owner, bypassing validation
    pub fn insert_raw(&self, owner_id: &str, raw: impl Into<String>) {
        self.lock().insert(owner_id.to_string(), raw.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn load(&self, owner_id: &str) -> Result<Option<VaultSnapshot>> {
        match self.lock().get(owner_id) {
            Some(raw) => decode_snapshot(owner_id, raw).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &VaultSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.lock().insert(snapshot.owner_id().to_string(), raw);
        Ok(())
    }

    fn clear(&self, owner_id: &str) -> Result<()> {
        self.lock().remove(owner_id);
        Ok(())
    }

    fn claim(&self, owner_id: &str) -> Result<()> {
        self.claims.claim(owner_id)
    }

    fn release(&self, owner_id: &str) {
        self.claims.release(owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::NewEntry;
    use crate::VaultSyncError;

    #[test]
    fn save_load_clear() {
        let cache = MemoryCache::new();
        assert!(cache.load("0xabc").unwrap().is_none());

        let mut snapshot = VaultSnapshot::new("0xabc");
        snapshot.add(NewEntry::new("a.com", "u", "p")).unwrap();
        cache.save(&snapshot).unwrap();
        assert_eq!(cache.load("0xabc").unwrap(), Some(snapshot));

        cache.clear("0xabc").unwrap();
        assert!(cache.load("0xabc").unwrap().is_none());
    }

    #[test]
    fn garbage_is_integrity_error() {
        let cache = MemoryCache::new();
        cache.insert_raw("0xabc", "{not json");
        assert!(matches!(
            cache.load("0xabc"),
            Err(VaultSyncError::Integrity(_))
        ));
    }
}
