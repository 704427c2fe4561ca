//! Platform-specific locations for the local cache and configuration

use std::path::PathBuf;

const APP_DIR: &str = "VaultSync";

/// Get the platform-specific data directory for storing application data
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\VaultSync
/// - macOS: ~/Library/Application Support/VaultSync
/// - Linux/Other: ~/.local/share/VaultSync
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Default location of the SQLite snapshot cache
pub fn default_cache_path() -> PathBuf {
    get_data_dir().join("cache.db")
}

/// Default location of `vaultsync.toml`
pub fn default_config_path() -> PathBuf {
    get_config_dir().join("vaultsync.toml")
}

/// Ensure the data directory exists
pub fn ensure_data_dir() -> std::io::Result<PathBuf> {
    let dir = get_data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        assert!(get_data_dir().ends_with(APP_DIR));
        assert!(get_config_dir().ends_with(APP_DIR));
        assert!(default_cache_path().ends_with("VaultSync/cache.db"));
        assert_eq!(
            default_config_path().file_name().and_then(|n| n.to_str()),
            Some("vaultsync.toml")
        );
    }
}
