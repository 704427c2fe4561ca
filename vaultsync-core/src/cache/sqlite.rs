//! SQLite-backed snapshot cache.

use super::{decode_snapshot, Claims, LocalCache};
use crate::crypto::fingerprint;
use crate::vault::VaultSnapshot;
use crate::{Result, VaultSyncError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Snapshot cache with one row per owner
///
/// Each row stores the snapshot JSON and its SHA-256 checksum; a row
/// whose checksum no longer matches is reported as `Integrity`.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    claims: Claims,
}

impl SqliteCache {
    /// Open a cache database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Create a new in-memory cache for testing
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS vault_snapshots (
                owner_id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                checksum TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            claims: Claims::default(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCache for SqliteCache {
    fn load(&self, owner_id: &str) -> Result<Option<VaultSnapshot>> {
        let row: Option<(String, String)> = self
            .lock()
            .query_row(
                "SELECT snapshot, checksum FROM vault_snapshots WHERE owner_id = ?1",
                params![owner_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((raw, checksum)) = row else {
            return Ok(None);
        };
        if fingerprint(&raw) != checksum {
            return Err(VaultSyncError::Integrity(format!(
                "checksum mismatch for {}",
                owner_id
            )));
        }
        decode_snapshot(owner_id, &raw).map(Some)
    }

    fn save(&self, snapshot: &VaultSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        let checksum = fingerprint(&raw);

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO vault_snapshots (owner_id, snapshot, checksum, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id) DO UPDATE SET
                snapshot = excluded.snapshot,
                checksum = excluded.checksum,
                updated_at = excluded.updated_at",
            params![
                snapshot.owner_id(),
                raw,
                checksum,
                snapshot.updated_at().timestamp_millis()
            ],
        )?;
        tx.commit()?;
        debug!(
            "Cached snapshot for {} ({} entries)",
            snapshot.owner_id(),
            snapshot.total_entries()
        );
        Ok(())
    }

    fn clear(&self, owner_id: &str) -> Result<()> {
        self.lock().execute(
            "DELETE FROM vault_snapshots WHERE owner_id = ?1",
            params![owner_id],
        )?;
        Ok(())
    }

    fn claim(&self, owner_id: &str) -> Result<()> {
        self.claims.claim(owner_id)
    }

    fn release(&self, owner_id: &str) {
        self.claims.release(owner_id)
    }
}
