use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::{Error, Result};

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub join_tables: JoinTableConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
}

/// How logical join-table names map onto physical identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct JoinTableConfig {
    /// Prepended to the logical name when no override exists.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl JoinTableConfig {
    pub fn physical_name(&self, logical: &str) -> String {
        match self.overrides.get(logical) {
            Some(physical) => physical.clone(),
            None => format!("{}{}", self.prefix, logical),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    /// RUNNING tasks older than this are failed with a timeout marker.
    /// Unset means tasks may stay RUNNING indefinitely.
    pub max_age_secs: Option<u64>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_engine_timeout")]
    pub engine_timeout_secs: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_age_secs: None,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            engine_timeout_secs: DEFAULT_ENGINE_TIMEOUT_SECS,
        }
    }
}

impl TaskConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_engine_timeout() -> u64 {
    DEFAULT_ENGINE_TIMEOUT_SECS
}

impl Config {
    pub fn sqlgate_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("no home directory".to_string()))?
            .join(".sqlgate"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::sqlgate_dir()?.join("sqlgate.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load_from");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            prefix = %config.join_tables.prefix,
            overrides = config.join_tables.overrides.len(),
            max_age_secs = ?config.tasks.max_age_secs,
            "config loaded"
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}
