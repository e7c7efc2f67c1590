use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::services::sync_channel::SyncTimings;
use crate::services::write_governor::GovernorPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Prefix of every local mirror key.
    pub app_namespace: String,

    /// Quiet period after the last update before a write is attempted
    pub debounce_ms: u64,

    /// Minimum gap between two physical writes of the same binding
    pub min_write_spacing_ms: u64,

    /// Writes admitted per data set within one governor window
    pub governor_max_writes: u32,

    pub governor_window_secs: u64,

    /// SQLite file used by the offline document store
    pub database_path: String,

    /// Directory for the file-backed local mirror
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_storage_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_namespace: "tally".to_string(),
            debounce_ms: 1500,
            min_write_spacing_ms: 3000,
            governor_max_writes: 20,
            governor_window_secs: 60,
            database_path: "tally.db".to_string(),
            local_storage_dir: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from the user's config directory, writing the
    /// defaults there on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            Ok(default_config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("tally").join("config.toml"))
    }

    pub fn timings(&self) -> SyncTimings {
        SyncTimings {
            debounce: Duration::from_millis(self.debounce_ms),
            min_write_spacing: Duration::from_millis(self.min_write_spacing_ms),
        }
    }

    pub fn governor_policy(&self) -> GovernorPolicy {
        GovernorPolicy {
            max_writes: self.governor_max_writes,
            window: Duration::from_secs(self.governor_window_secs),
        }
    }
}
