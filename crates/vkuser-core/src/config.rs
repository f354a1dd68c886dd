//! Application configuration management.
//!
//! This module handles loading and saving the configuration: API version,
//! default session options, cache lifetime and which backend holds tokens.
//!
//! Configuration is stored at `~/.config/vkuser/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::keychain::INDEX_FILE;
use crate::auth::persistence::CREDENTIALS_FILE;
use crate::auth::SessionOptions;
use crate::cache::manager::DEFAULT_LIFETIME_MINUTES;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "vkuser";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API version sent as `v=` with every call
pub const DEFAULT_API_VERSION: &str = "5.131";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_version: String,
    pub start_all_requests_immediately: bool,
    pub offline_mode: bool,
    pub cache_lifetime_minutes: i64,
    pub credential_backend: CredentialBackend,
    /// User designated current when the last command exited
    pub current_user_id: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            start_all_requests_immediately: options.start_all_requests_immediately,
            offline_mode: options.offline_mode,
            cache_lifetime_minutes: DEFAULT_LIFETIME_MINUTES,
            credential_backend: CredentialBackend::default(),
            current_user_id: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Where cached API responses live.
    pub fn responses_dir(&self) -> Result<PathBuf> {
        Ok(self.cache_dir()?.join("responses"))
    }

    /// Where the configured credential backend keeps its file.
    pub fn credentials_path(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        let file = match self.credential_backend {
            CredentialBackend::File => CREDENTIALS_FILE,
            CredentialBackend::Keyring => INDEX_FILE,
        };
        Ok(data_dir.join(APP_NAME).join(file))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            start_all_requests_immediately: self.start_all_requests_immediately,
            offline_mode: self.offline_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.session_options(), SessionOptions::default());
        assert_eq!(config.credential_backend, CredentialBackend::File);
        assert_eq!(config.cache_lifetime_minutes, 60);
        assert_eq!(config.current_user_id, None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let contents = r#"{"offline_mode": true, "credential_backend": "keyring"}"#;
        std::fs::write(&path, contents).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.offline_mode);
        assert!(config.start_all_requests_immediately);
        assert_eq!(config.credential_backend, CredentialBackend::Keyring);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            api_version: "5.199".to_string(),
            cache_lifetime_minutes: 15,
            current_user_id: Some(42),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }
}
