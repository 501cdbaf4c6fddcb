//! Router configuration
//!
//! Read from `config.toml` in the platform config directory, e.g.
//! `~/.config/source-signals/config.toml` on Linux. Every key is optional.

use crate::error::{Error, Result};
use crate::fingerprint::FingerprintMode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Subscription identifier used when none is configured
pub const DEFAULT_DISPATCH_UID: &str = "source_signal_receivers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// How source content is fingerprinted
    pub fingerprint: FingerprintMode,
    /// Stable identifier the router subscribes to lifecycle hooks with
    pub dispatch_uid: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fingerprint: FingerprintMode::default(),
            dispatch_uid: DEFAULT_DISPATCH_UID.to_string(),
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .context("Failed to parse router config")
            .map_err(Error::Config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))
            .map_err(Error::Config)?;
        Self::from_toml_str(&content)
    }

    /// Load from the default location, falling back to defaults when the file
    /// does not exist
    pub fn load_or_default() -> Result<Self> {
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .context("Failed to serialize router config")
            .map_err(Error::Config)
    }
}

/// `config.toml` inside the platform config directory
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "source-signals")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        let config = RouterConfig::from_toml_str("").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.dispatch_uid, DEFAULT_DISPATCH_UID);
    }

    #[test]
    fn test_partial_config() {
        let config = RouterConfig::from_toml_str("fingerprint = \"content\"\n").unwrap();
        assert_eq!(config.fingerprint, FingerprintMode::Content);
        assert_eq!(config.dispatch_uid, DEFAULT_DISPATCH_UID);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = RouterConfig::from_toml_str("fingerprint = \"md5\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = RouterConfig {
            fingerprint: FingerprintMode::Signature,
            dispatch_uid: "thumbnails".to_string(),
        };
        fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(RouterConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = default_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_or_default_uses_config_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

        let path = default_path().unwrap();
        assert_eq!(path, temp_dir.path().join("source-signals").join("config.toml"));
        assert_eq!(RouterConfig::load_or_default().unwrap(), RouterConfig::default());

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "dispatch_uid = \"thumbnails\"\n").unwrap();
        assert_eq!(RouterConfig::load_or_default().unwrap().dispatch_uid, "thumbnails");
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = RouterConfig::load(&temp_dir.path().join("missing.toml"));
        assert!(result.is_err());
    }
}
