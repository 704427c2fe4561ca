//! CLI configuration, loaded from `vaultsync.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vaultsync_core::platform;
use vaultsync_core::{SyncConfig, WalrusConfig};

/// Where encrypted blobs are published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    /// Walrus publisher/aggregator over HTTP
    #[default]
    Walrus,
    /// Content-addressed directory under the data dir
    Local,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Cache, pointer registry and local blobs live here
    pub data_dir: Option<PathBuf>,
    pub blob_store: BlobBackend,
    pub walrus: WalrusConfig,
    pub sync: SyncConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(platform::get_data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.blob_store, BlobBackend::Walrus);
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.walrus.epochs, 5);
        assert_eq!(config.data_dir(), platform::get_data_dir());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
data_dir = "/tmp/vaultsync"
blob_store = "local"

[sync]
debounce_ms = 250

[walrus]
epochs = 10
"#,
        )
        .unwrap();

        assert_eq!(config.data_dir(), PathBuf::from("/tmp/vaultsync"));
        assert_eq!(config.blob_store, BlobBackend::Local);
        assert_eq!(config.sync.debounce_ms, 250);
        assert_eq!(config.sync.kdf_iterations, 100_000);
        assert_eq!(config.walrus.epochs, 10);
        assert_eq!(config.walrus.timeout_secs, 30);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(toml::from_str::<CliConfig>(r#"blob_store = "s3""#).is_err());
    }
}
