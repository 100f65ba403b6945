//! Configuration file
//!
//! ```toml
//! [credentials."s3://my-bucket"]
//! key = "AKIA..."
//! secret = "..."
//!
//! [credentials."s3://"]
//! region = "eu-west-1"
//! ```

use crate::credentials::{CredentialRegistry, CredentialTable};
use crate::error::{UrifsError, UrifsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "URIFS_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UrifsConfig {
    /// Backend parameters keyed by `scheme://authority`
    pub credentials: CredentialTable,
}

impl UrifsConfig {
    pub fn from_toml_str(text: &str) -> UrifsResult<Self> {
        toml::from_str(text).map_err(|e| UrifsError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> UrifsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| UrifsError::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loading config");
        Self::from_toml_str(&text)
    }

    /// `$URIFS_CONFIG`, or `config.toml` in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("com", "urifs", "urifs")
            .map(|d| d.config_dir().join("config.toml"))
    }

    /// Load the default config. A file named by `$URIFS_CONFIG` must exist;
    /// a missing platform default just means no credentials.
    pub fn load_default() -> UrifsResult<Self> {
        if std::env::var_os(CONFIG_ENV).is_some() {
            if let Some(path) = Self::default_path() {
                return Self::load(path);
            }
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn credential_registry(&self) -> UrifsResult<CredentialRegistry> {
        CredentialRegistry::new(self.credentials.clone())
    }
}
