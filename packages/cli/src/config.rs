//! TOML run configuration.
//!
//! ```toml
//! [discovery]
//! agency_threshold = 3
//! workers = 2
//! request_delay_ms = { min = 500, max = 1500 }
//!
//! [api]
//! proxy = "http://127.0.0.1:8080"
//! ```
//!
//! Every key is optional. Command-line flags override file values.

use std::path::{Path, PathBuf};

use lessor_map_discovery_models::config::{ApiConfig, DiscoveryConfig};
use serde::Deserialize;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid configuration TOML.
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
}

/// Contents of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Planning, discovery, and resolution settings.
    pub discovery: DiscoveryConfig,
    /// Collaborator endpoints and transport settings.
    pub api: ApiConfig,
}

impl FileConfig {
    /// Loads `path`, or the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::de::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_uses_defaults() {
        assert_eq!(FileConfig::load(None).unwrap(), FileConfig::default());
    }

    #[test]
    fn sections_are_merged_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "[discovery]\nagency_threshold = 3\n\n[api]\nproxy = \"http://127.0.0.1:8080\"\n",
        )
        .unwrap();

        let config = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(config.discovery.agency_threshold, 3);
        assert_eq!(config.discovery.page_size, 50);
        assert_eq!(config.api.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn typos_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[discovery]\nagency_treshold = 3\n").unwrap();

        assert!(matches!(
            FileConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unreadable_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FileConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
