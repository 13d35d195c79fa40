//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server URL used when neither a flag nor the config file sets one
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// CLI configuration stored at `~/.config/mtop/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Metrics server URL
    pub server_url: Option<String>,
    /// Namespace used for pod queries without `-n`
    pub default_namespace: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Server URL: explicit value, then config file, then the default
    pub fn server_url(&self, explicit: Option<&str>) -> String {
        explicit
            .or(self.server_url.as_deref())
            .unwrap_or(DEFAULT_SERVER_URL)
            .to_string()
    }

    pub fn namespace(&self, explicit: Option<&str>) -> String {
        explicit
            .or(self.default_namespace.as_deref())
            .unwrap_or("default")
            .to_string()
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("mtop").join("config.json"))
    }
}
