//! Configuration loading for Homeostat.
//!
//! The configuration file lives at `~/.homeostat/config.toml`:
//!
//! ```toml
//! [regulator.max_active_explore_per_node]
//! default = 1
//! by_node_type = { org = 3 }
//! by_node = { "node-ops" = 0 }
//!
//! [regulator.max_active_stabilize_per_variable]
//! default = 1
//!
//! [signals]
//! root = "${HOME}/homeostat"
//! ```
//!
//! Values are parsed as written. Range checks (finite, non-negative) belong
//! to the policy resolver in `homeostat-core`, which rejects bad limits when
//! it is constructed.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Explore episodes a node may run at once when nothing overrides it.
pub const DEFAULT_MAX_ACTIVE_EXPLORE_PER_NODE: f64 = 1.0;
/// Stabilize episodes that may target one variable at once when nothing overrides it.
pub const DEFAULT_MAX_ACTIVE_STABILIZE_PER_VARIABLE: f64 = 1.0;

#[derive(Debug, Default, Deserialize)]
pub struct HomeostatConfig {
    #[serde(default)]
    pub regulator: RegulatorConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Concurrency limits for episodes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegulatorConfig {
    #[serde(default = "LimitConfig::explore_default")]
    pub max_active_explore_per_node: LimitConfig,
    #[serde(default = "LimitConfig::stabilize_default")]
    pub max_active_stabilize_per_variable: LimitConfig,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            max_active_explore_per_node: LimitConfig::explore_default(),
            max_active_stabilize_per_variable: LimitConfig::stabilize_default(),
        }
    }
}

/// One limit with its override tiers.
///
/// `by_node_type` keys are node type names (`personal`, `org`); `by_node`
/// keys are node IDs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LimitConfig {
    pub default: f64,
    #[serde(default)]
    pub by_node_type: BTreeMap<String, f64>,
    #[serde(default)]
    pub by_node: BTreeMap<String, f64>,
}

impl LimitConfig {
    #[must_use]
    pub fn new(default: f64) -> Self {
        Self {
            default,
            by_node_type: BTreeMap::new(),
            by_node: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_node_type(mut self, node_type: impl Into<String>, limit: f64) -> Self {
        self.by_node_type.insert(node_type.into(), limit);
        self
    }

    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>, limit: f64) -> Self {
        self.by_node.insert(node.into(), limit);
        self
    }

    fn explore_default() -> Self {
        Self::new(DEFAULT_MAX_ACTIVE_EXPLORE_PER_NODE)
    }

    fn stabilize_default() -> Self {
        Self::new(DEFAULT_MAX_ACTIVE_STABILIZE_PER_VARIABLE)
    }
}

/// Where the signal log lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SignalsConfig {
    /// Directory the log's fixed relative path is resolved against.
    /// `${VAR}` references are expanded. Defaults to the working directory.
    pub root: Option<String>,
}

impl SignalsConfig {
    #[must_use]
    pub fn root_dir(&self) -> PathBuf {
        match self.root.as_deref().map(str::trim) {
            Some(root) if !root.is_empty() => PathBuf::from(expand_env_vars(root)),
            _ => PathBuf::from("."),
        }
    }
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl HomeostatConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_if_present(&path),
            None => Ok(None),
        }
    }

    fn load_if_present(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %path.display(), "Failed to read config: {err}");
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!(path = %path.display(), "Failed to parse config: {err}");
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
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".homeostat").join("config.toml"))
}
