//! Configuration for Arbiter.
//!
//! Two layers live here:
//!
//! - [`ArbiterConfig`]: the on-disk TOML file (`~/.arbiter/config.toml`),
//!   holding context tunables and per-module overrides.
//! - [`Configuration`]: the runtime key/value store modules read from. Modules
//!   register their defaults at load time; file overrides always win.
//!
//! ```toml
//! [context]
//! tick_interval_ms = 10
//! default_max_age = 5.0
//!
//! [modules.echo]
//! prefix = "> "
//! ```

mod store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use store::{ConfigMap, Configuration};

const fn default_tick_interval_ms() -> u64 {
    10
}

const fn default_min_age() -> f64 {
    0.0
}

const fn default_max_age() -> f64 {
    5.0
}

const fn default_spike_retention() -> f64 {
    5.0
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for `{module}.{key}`: {reason}")]
    Value {
        module: String,
        key: String,
        reason: String,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Value { .. } => None,
        }
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ContextSettings {
    /// Period of the background re-evaluation pass. Default: 10ms.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Fallback lower age bound in seconds. Default: 0.
    #[serde(default = "default_min_age")]
    pub default_min_age: f64,
    /// Fallback upper age bound in seconds. Default: 5.
    #[serde(default = "default_max_age")]
    pub default_max_age: f64,
    /// How long a spike nobody listens for stays live, in seconds. Default: 5.
    #[serde(default = "default_spike_retention")]
    pub spike_retention: f64,
}

impl ContextSettings {
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            default_min_age: default_min_age(),
            default_max_age: default_max_age(),
            spike_retention: default_spike_retention(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ArbiterConfig {
    #[serde(default)]
    pub context: ContextSettings,
    /// Per-module overrides keyed by module name.
    #[serde(default)]
    pub modules: BTreeMap<String, toml::Table>,
}

impl ArbiterConfig {
    /// Load from the default location. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Build the runtime store holding this file's module overrides.
    pub fn configuration(&self) -> Result<Configuration, ConfigError> {
        let mut configuration = Configuration::new();
        for (module, table) in &self.modules {
            let mut overrides = ConfigMap::new();
            for (key, value) in table {
                let json = toml_to_json(value).map_err(|reason| ConfigError::Value {
                    module: module.clone(),
                    key: key.clone(),
                    reason,
                })?;
                overrides.insert(key.clone(), json);
            }
            configuration.apply_overrides(module, overrides);
        }
        Ok(configuration)
    }
}

/// Convert a TOML value to a JSON value.
fn toml_to_json(value: &toml::Value) -> Result<serde_json::Value, String> {
    match value {
        toml::Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        toml::Value::Integer(i) => Ok(serde_json::Value::Number((*i).into())),
        toml::Value::Float(f) => {
            let n =
                serde_json::Number::from_f64(*f).ok_or_else(|| format!("Invalid float: {f}"))?;
            Ok(serde_json::Value::Number(n))
        }
        toml::Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        toml::Value::Array(arr) => {
            let json_arr: Result<Vec<_>, _> = arr.iter().map(toml_to_json).collect();
            Ok(serde_json::Value::Array(json_arr?))
        }
        toml::Value::Table(table) => {
            let mut map = serde_json::Map::new();
            for (k, v) in table {
                map.insert(k.clone(), toml_to_json(v)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        toml::Value::Datetime(dt) => Ok(serde_json::Value::String(dt.to_string())),
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    arbiter_home().map(|home| home.join("config.toml"))
}

/// `~/.arbiter`, the directory holding config and logs.
#[must_use]
pub fn arbiter_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".arbiter"))
}
