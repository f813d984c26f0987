//! Host configuration.
//!
//! The known toolchains and the working root are read from `kdeploy.toml`:
//!
//! ```toml
//! work_root = "kdeploy-out"
//!
//! [toolchains]
//! helm = "/usr/local/bin/helm"
//! kubectl = "/usr/local/bin/kubectl"
//!
//! [vars]
//! CLUSTER = "eu-west-1"
//! ```
//!
//! Environment variables override the file: `KDEPLOY_TOOLCHAIN_<TOOL>` sets a
//! toolchain (`KDEPLOY_TOOLCHAIN_HELM`), `KDEPLOY_WORK_ROOT` the working root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::placeholder::Variables;
use crate::toolchain::Toolchains;

/// File name looked up in the current directory when no path is given.
pub const CONFIG_FILE: &str = "kdeploy.toml";

/// Default directory holding one working directory per target.
pub const DEFAULT_WORK_ROOT: &str = "kdeploy-out";

const TOOLCHAIN_ENV_PREFIX: &str = "KDEPLOY_TOOLCHAIN_";
const WORK_ROOT_ENV: &str = "KDEPLOY_WORK_ROOT";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  /// Known toolchains, used when a declaration sets no `toolchain`.
  pub toolchains: Toolchains,
  pub work_root: PathBuf,
  /// Variables visible to every declaration.
  pub vars: Variables,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      toolchains: Toolchains::new(),
      work_root: PathBuf::from(DEFAULT_WORK_ROOT),
      vars: Variables::new(),
    }
  }
}

impl Config {
  /// Load the configuration and apply environment overrides.
  ///
  /// With `path`, that file must exist. Without it, `kdeploy.toml` in the
  /// current directory is used if present.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::from_file(path)?,
      None if Path::new(CONFIG_FILE).is_file() => Self::from_file(Path::new(CONFIG_FILE))?,
      None => Self::default(),
    };
    config.apply_env(std::env::vars());
    Ok(config)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    debug!(path = ?path, "loading config");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Apply `KDEPLOY_*` overrides from `vars`.
  pub fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
    for (name, value) in vars {
      if let Some(tool) = name.strip_prefix(TOOLCHAIN_ENV_PREFIX) {
        if !tool.is_empty() {
          debug!(tool, executable = %value, "toolchain from environment");
          self.toolchains.insert(tool.to_lowercase(), value);
        }
      } else if name == WORK_ROOT_ENV {
        self.work_root = PathBuf::from(value);
      }
    }
  }
}
