//! Local stand-in for the chain-held pointer registry.

use super::{Capability, PointerReceipt, PointerRecord, PointerResolver, PointerSubmitter, PointerUpdate};
use crate::{Result, VaultSyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryEntry {
    record: PointerRecord,
    capability: Capability,
}

/// Pointer registry held in memory, optionally persisted to a JSON file
///
/// Enforces the same ownership rule as the chain: the first update for an
/// owner creates the record and yields a capability, and every later update
/// must present that capability.
#[derive(Debug)]
pub struct LocalPointerRegistry {
    records: Mutex<HashMap<String, RegistryEntry>>,
    path: Option<PathBuf>,
}

impl LocalPointerRegistry {
    pub fn in_memory() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    /// Open a file-backed registry; a missing file starts empty
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            records: Mutex::new(records),
            path: Some(path),
        })
    }

    /// Capability currently held for an owner
    pub fn capability_of(&self, owner: &str) -> Option<Capability> {
        self.lock().get(owner).map(|e| e.capability.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RegistryEntry>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, records: &HashMap<String, RegistryEntry>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&temp, path)?;
        Ok(())
    }
}

#[async_trait]
impl PointerResolver for LocalPointerRegistry {
    async fn resolve(&self, owner: &str) -> Result<Option<PointerRecord>> {
        Ok(self.lock().get(owner).map(|e| e.record.clone()))
    }
}

#[async_trait]
impl PointerSubmitter for LocalPointerRegistry {
    async fn submit(&self, update: PointerUpdate) -> Result<PointerReceipt> {
        let mut records = self.lock();
        let existing = records.get(&update.owner).cloned();

        let (created_at, capability) = match (&existing, &update.capability) {
            (None, None) => (
                update.requested_at,
                Capability::new(uuid::Uuid::new_v4().to_string()),
            ),
            (None, Some(_)) => {
                return Err(VaultSyncError::Capability(format!(
                    "no record exists for {}",
                    update.owner
                )))
            }
            (Some(_), None) => {
                return Err(VaultSyncError::Capability(format!(
                    "record for {} already exists",
                    update.owner
                )))
            }
            (Some(entry), Some(presented)) if presented != &entry.capability => {
                return Err(VaultSyncError::Capability(format!(
                    "capability does not match record for {}",
                    update.owner
                )))
            }
            (Some(entry), Some(_)) => (entry.record.created_at, entry.capability.clone()),
        };

        let record = PointerRecord {
            owner: update.owner.clone(),
            blob_id: update.blob_id,
            total_entries: update.total_entries,
            is_locked: update.is_locked,
            created_at,
            updated_at: update.requested_at.max(created_at),
        };
        records.insert(
            update.owner.clone(),
            RegistryEntry {
                record: record.clone(),
                capability: capability.clone(),
            },
        );

        if let Err(e) = self.persist(&records) {
            match existing {
                Some(previous) => records.insert(update.owner.clone(), previous),
                None => records.remove(&update.owner),
            };
            return Err(e);
        }

        info!("Pointer for {} now names blob {}", record.owner, record.blob_id);
        Ok(PointerReceipt { record, capability })
    }
}
