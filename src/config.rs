use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::{glog_debug, Error, Result};

/// Default cap on concurrently executing task bodies.
const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default bound on a single approval wait, in seconds.
const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of task bodies executed concurrently in one pass.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// How long to wait for a single approval before treating it as denied.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Resolve every approval request affirmatively without consulting a gate.
    #[serde(default)]
    pub auto_approve: bool,
}

fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}

fn default_approval_timeout_secs() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            auto_approve: false,
        }
    }
}

impl Config {
    pub fn gantry_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".gantry"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::gantry_dir()?.join("gantry.toml"))
    }

    /// The bound on a single approval wait as a [`Duration`].
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        glog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            glog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        glog_debug!(
            "Config loaded: max_parallel={}, approval_timeout_secs={}, auto_approve={}",
            config.max_parallel,
            config.approval_timeout_secs,
            config.auto_approve
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let gantry_dir = Self::gantry_dir()?;
        glog_debug!("Config::save gantry_dir={}", gantry_dir.display());
        if !gantry_dir.exists() {
            fs::create_dir_all(&gantry_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        glog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
