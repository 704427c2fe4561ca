//! Vault session: local-first mutations plus the background publish pipeline.
//!
//! Every mutation is written to the local cache before it returns. A
//! background worker waits for a quiet debounce window, then serializes
//! the latest snapshot, encrypts it, uploads it to the blob store and
//! submits a pointer update. At most one sync runs per session.

use crate::cache::LocalCache;
use crate::crypto::{EncryptedBlob, VaultCodec};
use crate::identity::IdentityProvider;
use crate::pointer::{Capability, PointerResolver, PointerSubmitter, PointerUpdate};
use crate::storage::{BlobId, BlobStore};
use crate::sync::config::SyncConfig;
use crate::sync::models::{BootstrapOutcome, SyncFailure, SyncPhase, SyncStatus};
use crate::vault::{EntryPatch, NewEntry, PasswordEntry, VaultInfo, VaultPayload, VaultSnapshot};
use crate::{Result, VaultSyncError};
use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Storage collaborators a session runs against.
#[derive(Clone)]
pub struct SyncBackends {
    pub cache: Arc<dyn LocalCache>,
    pub blobs: Arc<dyn BlobStore>,
    pub resolver: Arc<dyn PointerResolver>,
    pub submitter: Arc<dyn PointerSubmitter>,
}

impl SyncBackends {
    /// Use one registry for both pointer reads and submissions
    pub fn with_registry<R>(
        cache: Arc<dyn LocalCache>,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<R>,
    ) -> Self
    where
        R: PointerResolver + PointerSubmitter + 'static,
    {
        Self {
            cache,
            blobs,
            resolver: registry.clone(),
            submitter: registry,
        }
    }
}

struct ActiveVault {
    /// `None` while locked
    snapshot: Option<VaultSnapshot>,
    /// The snapshot has not been written to the cache yet
    unpersisted: bool,
    /// A published vault exists but could not be restored
    restore_failed: bool,
}

impl ActiveVault {
    fn cached(snapshot: VaultSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            unpersisted: false,
            restore_failed: false,
        }
    }

    fn fresh(owner_id: &str) -> Self {
        Self {
            snapshot: Some(VaultSnapshot::new(owner_id)),
            unpersisted: true,
            restore_failed: false,
        }
    }
}

struct SessionInner {
    owner_id: String,
    identity: Arc<dyn IdentityProvider>,
    config: SyncConfig,
    codec: VaultCodec,
    backends: SyncBackends,
    active: Mutex<ActiveVault>,
    /// Single-flight guard for the publish pipeline
    flight: tokio::sync::Mutex<()>,
    /// A background sync was skipped while another was in flight
    rerun: AtomicBool,
    revisions: watch::Sender<u64>,
    status: watch::Sender<SyncStatus>,
    capability: Mutex<Option<Capability>>,
}

/// An open vault for one owner.
///
/// Only one session per owner may be open against a cache at a time.
/// Dropping the session stops its background worker; changes not yet
/// published stay in the cache and are reported as pending next time.
pub struct VaultSession {
    inner: Arc<SessionInner>,
    worker: JoinHandle<()>,
}

impl VaultSession {
    /// Open the vault for the identity's owner.
    ///
    /// A snapshot already in the cache is used as-is and the remote is not
    /// consulted. Only an empty cache triggers a restore from the owner's
    /// pointer record.
    pub async fn open(
        identity: Arc<dyn IdentityProvider>,
        backends: SyncBackends,
        config: SyncConfig,
    ) -> Result<(Self, BootstrapOutcome)> {
        let owner_id = identity.owner_id();
        if owner_id.trim().is_empty() {
            return Err(VaultSyncError::Validation("owner id is required".to_string()));
        }
        let codec = VaultCodec::new(config.kdf_params())?;

        backends.cache.claim(&owner_id)?;
        let (active, outcome) =
            match bootstrap(&owner_id, identity.as_ref(), &backends, &config, codec).await {
                Ok(bootstrapped) => bootstrapped,
                Err(e) => {
                    backends.cache.release(&owner_id);
                    return Err(e);
                }
            };
        info!("Opened vault for {}: {:?}", owner_id, outcome);

        let mut status = match &active.snapshot {
            Some(snapshot) => SyncStatus {
                pending: !active.unpersisted && snapshot.has_unsynced_changes(),
                last_blob_id: snapshot.last_synced_blob_id.clone(),
                ..SyncStatus::default()
            },
            None => SyncStatus::default(),
        };
        if let BootstrapOutcome::RestoreFailed { error } = &outcome {
            status.phase = SyncPhase::Failed;
            status.last_error = Some(error.clone());
        }
        let (revisions, revision_rx) = watch::channel(0u64);
        let (status, _) = watch::channel(status);

        let inner = Arc::new(SessionInner {
            capability: Mutex::new(identity.capability()),
            owner_id,
            identity,
            config,
            codec,
            backends,
            active: Mutex::new(active),
            flight: tokio::sync::Mutex::new(()),
            rerun: AtomicBool::new(false),
            revisions,
            status,
        });
        let worker = tokio::spawn(run_worker(inner.clone(), revision_rx));

        Ok((Self { inner, worker }, outcome))
    }

    pub fn owner_id(&self) -> &str {
        &self.inner.owner_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Publish the initial snapshot, establishing the pointer record.
    ///
    /// Returns the existing blob id if the vault was already published.
    pub async fn create_vault(&self) -> Result<BlobId> {
        if let Some(blob_id) = self.inner.latest_snapshot()?.last_synced_blob_id {
            return Ok(blob_id);
        }
        self.sync_vault().await
    }

    pub fn add_entry(&self, input: NewEntry) -> Result<PasswordEntry> {
        self.inner.mutate(|vault| vault.add(input))
    }

    pub fn update_entry(&self, id: &Uuid, patch: EntryPatch) -> Result<PasswordEntry> {
        self.inner.mutate(|vault| vault.update(id, patch))
    }

    pub fn delete_entry(&self, id: &Uuid) -> Result<()> {
        self.inner.mutate(|vault| vault.delete(id)).map(|_| ())
    }

    pub fn record_usage(&self, id: &Uuid) -> Result<PasswordEntry> {
        self.inner.mutate(|vault| vault.record_usage(id))
    }

    pub fn get_entry(&self, id: &Uuid) -> Result<Option<PasswordEntry>> {
        self.inner.read(|vault| vault.get(id).cloned())
    }

    pub fn search_entries(&self, query: &str) -> Result<Vec<PasswordEntry>> {
        self.inner.read(|vault| vault.search(query))
    }

    pub fn list_entries(&self) -> Result<Vec<PasswordEntry>> {
        self.inner.read(|vault| vault.entries().to_vec())
    }

    pub fn get_vault_info(&self) -> VaultInfo {
        let status = self.status();
        let active = self.inner.active();
        match &active.snapshot {
            Some(snapshot) => VaultInfo {
                total_entries: snapshot.total_entries(),
                last_updated: Some(snapshot.updated_at()),
                is_locked: snapshot.is_locked,
                last_synced_blob_id: snapshot.last_synced_blob_id.clone(),
                sync_phase: status.phase,
            },
            None => VaultInfo {
                total_entries: 0,
                last_updated: None,
                is_locked: true,
                last_synced_blob_id: status.last_blob_id,
                sync_phase: status.phase,
            },
        }
    }

    /// Drop the decrypted view; the cached snapshot is left untouched
    pub fn lock_vault(&self) {
        if self.inner.active().snapshot.take().is_some() {
            info!("Vault for {} locked", self.inner.owner_id);
        }
    }

    /// Reload the decrypted view from the cache.
    ///
    /// A cache that is empty or corrupt by now is handled like a fresh
    /// open: the published vault is restored, and if that fails the session
    /// refuses to publish until the user changes something.
    pub async fn unlock_vault(&self) -> Result<BootstrapOutcome> {
        let inner = &self.inner;
        if !self.is_locked() {
            return Ok(BootstrapOutcome::Local);
        }

        let (active, outcome) = bootstrap(
            &inner.owner_id,
            inner.identity.as_ref(),
            &inner.backends,
            &inner.config,
            inner.codec,
        )
        .await?;
        {
            let mut current = inner.active();
            if current.snapshot.is_some() {
                return Ok(BootstrapOutcome::Local);
            }
            *current = active;
        }

        match &outcome {
            BootstrapOutcome::Restored { blob_id } => {
                let blob_id = blob_id.clone();
                inner.status.send_modify(|status| {
                    status.pending = false;
                    status.last_blob_id = Some(blob_id);
                });
            }
            BootstrapOutcome::RestoreFailed { error } => {
                let error = error.clone();
                inner.status.send_modify(|status| {
                    status.phase = SyncPhase::Failed;
                    status.last_error = Some(error);
                });
            }
            BootstrapOutcome::Local | BootstrapOutcome::Created => {}
        }
        info!("Vault for {} unlocked: {:?}", inner.owner_id, outcome);
        Ok(outcome)
    }

    pub fn is_locked(&self) -> bool {
        self.inner.active().snapshot.is_none()
    }

    /// Run the publish pipeline now.
    ///
    /// Waits for an in-flight sync first. Returns the blob id of the
    /// latest snapshot, uploading only if it has unpublished changes.
    pub async fn sync_vault(&self) -> Result<BlobId> {
        self.inner.sync_now().await
    }

    /// Publish pending changes, if any
    pub async fn flush(&self) -> Result<Option<BlobId>> {
        if !self.inner.has_pending() {
            return Ok(None);
        }
        self.sync_vault().await.map(Some)
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch sync status changes
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Capability for the next pointer update
    pub fn capability(&self) -> Option<Capability> {
        self.inner.current_capability()
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.worker.abort();
        self.inner.backends.cache.release(&self.inner.owner_id);
    }
}

impl SessionInner {
    fn active(&self) -> MutexGuard<'_, ActiveVault> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_capability(&self) -> Option<Capability> {
        self.capability
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_capability(&self, capability: Capability) {
        *self.capability.lock().unwrap_or_else(|e| e.into_inner()) = Some(capability);
    }

    fn schedule(&self) {
        self.revisions.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut VaultSnapshot) -> Result<T>) -> Result<T> {
        let value = {
            let mut guard = self.active();
            let active = &mut *guard;
            let mut next = active
                .snapshot
                .clone()
                .ok_or(VaultSyncError::VaultLocked)?;
            let value = apply(&mut next)?;
            self.backends.cache.save(&next)?;
            active.snapshot = Some(next);
            active.unpersisted = false;
            active.restore_failed = false;
            value
        };

        self.status.send_modify(|status| {
            status.pending = true;
            if status.phase != SyncPhase::Syncing {
                status.phase = SyncPhase::Idle;
            }
        });
        self.schedule();
        Ok(value)
    }

    fn read<T>(&self, view: impl FnOnce(&VaultSnapshot) -> T) -> Result<T> {
        self.active()
            .snapshot
            .as_ref()
            .map(view)
            .ok_or(VaultSyncError::VaultLocked)
    }

    /// Latest snapshot: the active view, or the cached copy while locked
    fn latest_snapshot(&self) -> Result<VaultSnapshot> {
        let active = self.active();
        if active.restore_failed {
            return Err(VaultSyncError::Remote(format!(
                "published vault for {} was not restored; refusing to replace it",
                self.owner_id
            )));
        }
        match &active.snapshot {
            Some(snapshot) => Ok(snapshot.clone()),
            None => load_cached(self.backends.cache.as_ref(), &self.owner_id)?
                .ok_or_else(|| VaultSyncError::NotFound(format!("Local vault for {}", self.owner_id))),
        }
    }

    fn has_pending(&self) -> bool {
        if self.active().unpersisted {
            return false;
        }
        self.latest_snapshot()
            .map(|snapshot| snapshot.has_unsynced_changes())
            .unwrap_or(false)
    }

    async fn sync_now(&self) -> Result<BlobId> {
        let flight = self.flight.lock().await;
        let result = self.sync_once().await;
        drop(flight);
        self.settle();
        result
    }

    async fn sync_background(&self) -> Result<()> {
        let Ok(flight) = self.flight.try_lock() else {
            debug!("Sync for {} already in flight; coalescing", self.owner_id);
            self.rerun.store(true, Ordering::SeqCst);
            return Ok(());
        };
        let result = self.sync_once().await;
        drop(flight);
        self.settle();
        result.map(|_| ())
    }

    // Re-trigger a background sync that was skipped while one was in flight
    fn settle(&self) {
        if self.rerun.swap(false, Ordering::SeqCst) && self.has_pending() {
            self.schedule();
        }
    }

    async fn sync_once(&self) -> Result<BlobId> {
        let snapshot = self.latest_snapshot()?;
        if !snapshot.has_unsynced_changes() {
            if let Some(blob_id) = snapshot.last_synced_blob_id {
                debug!("Vault for {} already published as {}", self.owner_id, blob_id);
                return Ok(blob_id);
            }
        }

        self.status.send_modify(|status| status.phase = SyncPhase::Syncing);
        match self.publish(&snapshot).await {
            Ok(blob_id) => {
                self.commit(&blob_id, snapshot.updated_at());
                Ok(blob_id)
            }
            Err(e) => {
                warn!("Sync for {} failed: {}", self.owner_id, e);
                let failure = SyncFailure::from(&e);
                self.status.send_modify(|status| {
                    status.phase = SyncPhase::Failed;
                    status.last_error = Some(failure);
                });
                Err(e)
            }
        }
    }

    /// serialize -> encrypt -> upload -> pointer update
    async fn publish(&self, snapshot: &VaultSnapshot) -> Result<BlobId> {
        let plaintext = Zeroizing::new(VaultPayload::from_snapshot(snapshot).to_bytes()?);
        let secret = self.identity.master_key_material();
        let codec = self.codec;
        let wire = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let blob = codec.encrypt(&plaintext, secret.expose())?;
            Ok(blob.to_wire()?)
        })
        .await
        .map_err(join_error)??;

        let blob_id = retrying(&self.config, "blob upload", || {
            self.backends.blobs.put(&wire)
        })
        .await?;
        debug!(
            "Uploaded {} bytes for {} as {}",
            wire.len(),
            self.owner_id,
            blob_id
        );

        let locked = snapshot.is_locked || self.active().snapshot.is_none();
        let update = PointerUpdate::build(
            &self.owner_id,
            blob_id.clone(),
            self.current_capability(),
            snapshot.total_entries(),
            locked,
        );
        let receipt = retrying(&self.config, "pointer update", || {
            self.backends.submitter.submit(update.clone())
        })
        .await?;
        self.store_capability(receipt.capability);

        Ok(blob_id)
    }

    fn commit(&self, blob_id: &BlobId, published_updated_at: DateTime<Utc>) {
        let pending = {
            let mut guard = self.active();
            let active = &mut *guard;
            match active.snapshot.as_mut() {
                Some(snapshot) => {
                    snapshot.mark_synced(blob_id.clone(), published_updated_at);
                    match self.backends.cache.save(snapshot) {
                        Ok(()) => active.unpersisted = false,
                        Err(e) => error!("Failed to cache sync result for {}: {}", self.owner_id, e),
                    }
                    snapshot.has_unsynced_changes()
                }
                // Locked: record the commit on the cached copy
                None => match load_cached(self.backends.cache.as_ref(), &self.owner_id) {
                    Ok(Some(mut cached)) => {
                        cached.mark_synced(blob_id.clone(), published_updated_at);
                        if let Err(e) = self.backends.cache.save(&cached) {
                            error!("Failed to cache sync result for {}: {}", self.owner_id, e);
                        }
                        cached.has_unsynced_changes()
                    }
                    _ => false,
                },
            }
        };

        info!("Vault for {} committed as blob {}", self.owner_id, blob_id);
        self.status.send_modify(|status| {
            status.phase = SyncPhase::Committed;
            status.pending = pending;
            status.last_blob_id = Some(blob_id.clone());
            status.last_error = None;
            status.last_synced_at = Some(Utc::now());
        });
    }
}

async fn run_worker(inner: Arc<SessionInner>, mut revisions: watch::Receiver<u64>) {
    let debounce = inner.config.debounce();
    let max_wait = inner.config.max_wait();
    while revisions.changed().await.is_ok() {
        // Wait for a quiet debounce window, capped by max_wait since the first change
        let deadline = Instant::now() + max_wait;
        loop {
            let quiet_until = (Instant::now() + debounce).min(deadline);
            match tokio::time::timeout_at(quiet_until, revisions.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return,
                Err(_) => break,
            }
        }
        if let Err(e) = inner.sync_background().await {
            debug!("Background sync for {} ended with {}", inner.owner_id, e.kind());
        }
    }
}

async fn bootstrap(
    owner_id: &str,
    identity: &dyn IdentityProvider,
    backends: &SyncBackends,
    config: &SyncConfig,
    codec: VaultCodec,
) -> Result<(ActiveVault, BootstrapOutcome)> {
    if let Some(snapshot) = load_cached(backends.cache.as_ref(), owner_id)? {
        return Ok((ActiveVault::cached(snapshot), BootstrapOutcome::Local));
    }

    match restore(owner_id, identity, backends, config, codec).await {
        Ok(Some((snapshot, blob_id))) => {
            backends.cache.save(&snapshot)?;
            info!(
                "Restored {} entries for {} from blob {}",
                snapshot.total_entries(),
                owner_id,
                blob_id
            );
            Ok((
                ActiveVault::cached(snapshot),
                BootstrapOutcome::Restored { blob_id },
            ))
        }
        Ok(None) => Ok((ActiveVault::fresh(owner_id), BootstrapOutcome::Created)),
        Err(e) => {
            warn!("Restore for {} failed: {}", owner_id, e);
            let mut active = ActiveVault::fresh(owner_id);
            active.restore_failed = true;
            Ok((
                active,
                BootstrapOutcome::RestoreFailed {
                    error: SyncFailure::from(&e),
                },
            ))
        }
    }
}

async fn restore(
    owner_id: &str,
    identity: &dyn IdentityProvider,
    backends: &SyncBackends,
    config: &SyncConfig,
    codec: VaultCodec,
) -> Result<Option<(VaultSnapshot, BlobId)>> {
    let record = retrying(config, "pointer resolve", || {
        backends.resolver.resolve(owner_id)
    })
    .await?;
    let Some(record) = record else {
        return Ok(None);
    };

    let wire = retrying(config, "blob fetch", || backends.blobs.get(&record.blob_id)).await?;
    let blob = EncryptedBlob::from_wire(&wire)?;
    let secret = identity.master_key_material();
    let plaintext = Zeroizing::new(
        tokio::task::spawn_blocking(move || codec.decrypt(&blob, secret.expose()))
            .await
            .map_err(join_error)??,
    );

    let snapshot = VaultPayload::from_bytes(&plaintext)?.into_snapshot(
        owner_id,
        record.blob_id.clone(),
        record.created_at,
    )?;
    Ok(Some((snapshot, record.blob_id)))
}

/// Load from the cache, treating untrustworthy data as absent
fn load_cached(cache: &dyn LocalCache, owner_id: &str) -> Result<Option<VaultSnapshot>> {
    match cache.load(owner_id) {
        Err(VaultSyncError::Integrity(reason)) => {
            error!("Local cache for {} is corrupt, ignoring it: {}", owner_id, reason);
            Ok(None)
        }
        other => other,
    }
}

/// Run one remote call with a per-attempt timeout, retrying retryable failures
async fn retrying<T, F, Fut>(config: &SyncConfig, op: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let limit = config.request_timeout();
    let backoff = ExponentialBuilder::default()
        .with_min_delay(config.retry_min_delay())
        .with_max_delay(config.retry_max_delay())
        .with_max_times(config.max_retries);

    (|| {
        let attempt = call();
        async move {
            tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| {
                    Err(VaultSyncError::Timeout(format!(
                        "{} exceeded {:?}",
                        op, limit
                    )))
                })
        }
    })
    .retry(backoff)
    .when(|e: &VaultSyncError| e.is_retryable())
    .notify(|e: &VaultSyncError, delay| {
        warn!("{} failed: {}; retrying in {:?}", op, e, delay)
    })
    .await
}

fn join_error(e: tokio::task::JoinError) -> VaultSyncError {
    VaultSyncError::Io(std::io::Error::other(e.to_string()))
}
