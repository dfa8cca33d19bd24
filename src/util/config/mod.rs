//! cosched configuration system
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (COSCHED_*)
//! 3. Project-level file (cosched.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use cosched::util::config::CoschedConfig;
//!
//! let mut config = CoschedConfig::from_toml_str("[scheduler]\nmax_tasks = 16\n").unwrap();
//! config.apply_env().unwrap();
//! ```
//!
//! # File format
//!
//! ```toml
//! [scheduler]
//! max_tasks = 128
//! stack_size = 65536
//! idle = "spin"      # or "yield"
//!
//! [log]
//! level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::scheduler::{IdleStrategy, SchedulerConfig};
use crate::util::logger::LogLevel;

/// Name of the project-level configuration file.
pub const CONFIG_FILE_NAME: &str = "cosched.toml";

/// Environment variable overriding `scheduler.max_tasks`.
pub const ENV_MAX_TASKS: &str = "COSCHED_MAX_TASKS";
/// Environment variable overriding `scheduler.stack_size`.
pub const ENV_STACK_SIZE: &str = "COSCHED_STACK_SIZE";
/// Environment variable overriding `scheduler.idle`.
pub const ENV_IDLE: &str = "COSCHED_IDLE";
/// Environment variable overriding `log.level`.
pub const ENV_LOG: &str = "COSCHED_LOG";

/// Whole-file configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoschedConfig {
    /// Scheduler settings
    pub scheduler: SchedulerConfig,
    /// Logging settings
    pub log: LogConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level that is printed
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value `{value}` for {var}: {reason}")]
    Override {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl CoschedConfig {
    /// Parse a configuration from TOML text. Missing keys keep their
    /// defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `COSCHED_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_MAX_TASKS) {
            self.scheduler.max_tasks = parse_override(ENV_MAX_TASKS, value)?;
        }
        if let Some(value) = lookup(ENV_STACK_SIZE) {
            self.scheduler.stack_size = parse_override(ENV_STACK_SIZE, value)?;
        }
        if let Some(value) = lookup(ENV_IDLE) {
            self.scheduler.idle = parse_override::<IdleStrategy>(ENV_IDLE, value)?;
        }
        if let Some(value) = lookup(ENV_LOG) {
            self.log.level = parse_override::<LogLevel>(ENV_LOG, value)?;
        }
        Ok(())
    }
}

fn parse_override<T>(
    var: &'static str,
    value: String,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Override {
        var,
        reason: e.to_string(),
        value,
    })
}

/// Load a configuration file
pub fn load_config(path: &Path) -> Result<CoschedConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    CoschedConfig::from_toml_str(&content)
}

/// Load `cosched.toml` from `dir`
/// Returns default config if file doesn't exist
pub fn load_project_config(dir: &Path) -> Result<CoschedConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(CoschedConfig::default());
    }
    load_config(&path)
}
