//! Sync pipeline tuning.

use crate::crypto::{KdfParams, DEFAULT_ITERATIONS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry policy for one vault session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before a sync starts
    pub debounce_ms: u64,
    /// Longest a steady stream of mutations can hold a sync back
    pub max_wait_ms: u64,
    /// Retries after the first attempt of a retryable step
    pub max_retries: usize,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Upper bound on each remote call
    pub request_timeout_secs: u64,
    pub kdf_iterations: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1500,
            max_wait_ms: 10_000,
            max_retries: 3, // total attempts = 4
            retry_min_delay_ms: 200,
            retry_max_delay_ms: 2000,
            request_timeout_secs: 30,
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Never shorter than the debounce window
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.max(self.debounce_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms.max(self.retry_min_delay_ms))
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams::with_iterations(self.kdf_iterations)
    }
}
