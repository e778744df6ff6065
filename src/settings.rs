use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{chemistry::Chemistry, stats::DeviceDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    pub device: DeviceConfig,

    /// Directory holding the statistics files. Defaults to the user's state
    /// directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,

    /// Seconds between samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval: u64,

    /// Derive charge from voltage even if the UPS reports one
    #[serde(default)]
    pub calc_charge: bool,
}

fn default_sample_interval() -> u64 {
    60
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            descriptor: DeviceDescriptor {
                dev_id: "ups".to_string(),
                chemistry: Chemistry::LeadAcid,
                nominal_voltage: 12.0,
                capacity: 7.0,
            },
            sample_interval: default_sample_interval(),
            calc_charge: false,
        }
    }
}

impl StatsConfig {
    /// Directory the statistics files live in, if one can be found.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.state_dir.clone().or_else(|| {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .map(|dir| dir.join("ups-battstats"))
        })
    }
}

/// load configuration from file, create default if doesn't exist
pub fn load_config(path: &Path) -> Result<StatsConfig> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        let config: StatsConfig = serde_json::from_str(&content)
            .with_context(|| format!("couldn't parse configuration {}", path.display()))?;
        log::info!("loaded configuration from: {}", path.display());
        return Ok(config);
    }

    let default_config = StatsConfig::default();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(&default_config)?;
    fs::write(path, content)?;
    log::info!("created default configuration at: {}", path.display());

    Ok(default_config)
}

/// Get the configuration file path
pub fn config_path() -> PathBuf {
    // XDG config directory or ~/.config
    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config")
    } else {
        PathBuf::from("./config")
    };

    config_dir.join("ups-battstats").join("config.json")
}
