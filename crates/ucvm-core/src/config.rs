use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::transfer::TransferOptions;

/// HTTP transfer tuning (optional `[transfer]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Seconds to wait for the TCP/TLS connection to be established.
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/sec for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// Maximum number of redirects followed (mirrors commonly redirect).
    pub max_redirections: u32,
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            max_redirections: 10,
            user_agent: format!("ucvm/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransferConfig {
    pub fn to_options(&self) -> TransferOptions {
        TransferOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            low_speed_limit: self.low_speed_limit,
            low_speed_time: Duration::from_secs(self.low_speed_time_secs),
            max_redirections: self.max_redirections,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Collection size limits enforced when the settings document is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLimits {
    pub max_vm_configs: usize,
    /// Built-in presets count against this limit but are never evicted.
    pub max_package_presets: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_vm_configs: 50,
            max_package_presets: 100,
        }
    }
}

/// Global configuration loaded from `~/.config/ucvm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UcvmConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub limits: StoreLimits,
    /// How long finished (complete/error) download records are kept in state.json.
    #[serde(default = "default_retention_secs")]
    pub download_retention_secs: u64,
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for UcvmConfig {
    fn default() -> Self {
        Self {
            transfer: TransferConfig::default(),
            limits: StoreLimits::default(),
            download_retention_secs: default_retention_secs(),
        }
    }
}

impl UcvmConfig {
    pub fn download_retention(&self) -> Duration {
        Duration::from_secs(self.download_retention_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("ucvm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UcvmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UcvmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UcvmConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
