//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which records where the editor's state database lives and how long to
//! wait on its lock.
//!
//! Configuration is stored at `~/.config/authcache/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use authcache_core::StoreConfig;
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "authcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Location of the editor's state database, relative to the platform config dir
const EDITOR_STATE_DB: [&str; 4] = ["Cursor", "User", "globalStorage", "state.vscdb"];

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
    #[serde(default)]
    pub create_if_missing: bool,
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Pick the database path: explicit override first, then the saved
    /// config, then the editor's default location.
    pub fn resolve_db_path(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path {
            return Ok(path.to_path_buf());
        }
        if let Some(ref path) = self.db_path {
            return Ok(path.clone());
        }
        default_db_path()
    }

    pub fn store_config(&self, override_path: Option<&Path>, create: bool) -> Result<StoreConfig> {
        let mut store_config = StoreConfig::new(self.resolve_db_path(override_path)?)
            .with_create_if_missing(create || self.create_if_missing);
        if let Some(ms) = self.busy_timeout_ms {
            store_config = store_config.with_busy_timeout_ms(ms);
        }
        Ok(store_config)
    }
}

/// Where the editor keeps its state database on this platform
pub fn default_db_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
    Ok(EDITOR_STATE_DB
        .iter()
        .fold(config_dir, |path, part| path.join(part)))
}
