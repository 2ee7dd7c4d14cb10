use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tapswap_sdk::Network;

use crate::service::ServiceError;

pub const CONFIG_FILE: &str = "tapswap.json";
const DB_FILE: &str = "tapswap.db";
const DEFAULT_WATCH_INTERVAL_SECONDS: i64 = 60;

// ============================================================================
// On-disk config
// ============================================================================

/// Contents of `tapswap.json`. Every field is optional; missing ones fall back
/// to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrum_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch_interval_seconds: Option<i64>,
}

/// Values given on the command line or through the environment. They win
/// over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub network: Option<Network>,
    pub electrum_url: Option<String>,
    pub mnemonic: Option<String>,
    pub watch_interval_seconds: Option<i64>,
}

// ============================================================================
// Resolved config
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,
    pub electrum_url: String,
    pub data_dir: PathBuf,
    pub mnemonic: Option<String>,
    /// Seconds between watcher sweeps; zero or negative disables the watcher.
    pub watch_interval_seconds: i64,
}

impl Config {
    /// Load `tapswap.json` from `data_dir` (if present) and apply overrides.
    pub fn load(data_dir: &Path, overrides: ConfigOverrides) -> Result<Self, ServiceError> {
        let file = Self::read_file(data_dir)?.unwrap_or_default();

        let network = match (overrides.network, file.network.as_deref()) {
            (Some(network), _) => network,
            (None, Some(name)) => name.parse().map_err(ServiceError::Config)?,
            (None, None) => Network::Liquid,
        };
        let electrum_url = overrides
            .electrum_url
            .or(file.electrum_url)
            .unwrap_or_else(|| network.default_electrum_url().to_string());
        let watch_interval_seconds = overrides
            .watch_interval_seconds
            .or(file.watch_interval_seconds)
            .unwrap_or(DEFAULT_WATCH_INTERVAL_SECONDS);

        Ok(Self {
            network,
            electrum_url,
            data_dir: data_dir.to_path_buf(),
            mnemonic: overrides.mnemonic.filter(|m| !m.trim().is_empty()),
            watch_interval_seconds,
        })
    }

    fn read_file(data_dir: &Path) -> Result<Option<ConfigFile>, ServiceError> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))
    }

    /// Write the persistent part of this config (never the mnemonic).
    pub fn save(&self) -> Result<(), ServiceError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| ServiceError::Config(format!("{}: {e}", self.data_dir.display())))?;
        let file = ConfigFile {
            network: Some(self.network.as_str().to_string()),
            electrum_url: Some(self.electrum_url.clone()),
            watch_interval_seconds: Some(self.watch_interval_seconds),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        fs::write(self.data_dir.join(CONFIG_FILE), json)
            .map_err(|e| ServiceError::Config(e.to_string()))
    }

    /// Sweep interval, or `None` when the watcher is disabled.
    pub fn watch_interval(&self) -> Option<Duration> {
        u64::try_from(self.watch_interval_seconds)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// SQLite database for this network.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(self.network.as_str()).join(DB_FILE)
    }
}
