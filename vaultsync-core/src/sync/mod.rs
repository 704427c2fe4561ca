//! Sync orchestration between the local cache, the blob store and the pointer record
//!
//! - Local-first: mutations land in the cache before they return
//! - Debounced, single-flight publish of whole encrypted snapshots
//! - Restore from the pointer record only when the local cache is empty
//! - Whole-snapshot last-write-wins across devices, with no conflict detection

pub mod config;
mod engine;
pub mod models;

pub use config::SyncConfig;
pub use engine::{SyncBackends, VaultSession};
pub use models::{BootstrapOutcome, SyncFailure, SyncPhase, SyncStatus};
