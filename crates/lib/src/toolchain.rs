//! Toolchain resolution.
//!
//! Every compiled target carries a tool table (`helm` -> executable). The
//! executable comes from the declaration's explicit `toolchain` field or, when
//! that is unset, from the process-wide known toolchains. Resolution happens
//! once at compile time; lifecycle scripts only read the stored value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compile::CompileError;
use crate::declaration::Setting;

/// Known toolchains: tool name -> executable path or reference.
///
/// Built once at process start (see [`crate::config::Config`]) and passed by
/// reference into compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Toolchains(BTreeMap<String, String>);

impl Toolchains {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  pub fn with(mut self, tool: impl Into<String>, executable: impl Into<String>) -> Self {
    self.insert(tool, executable);
    self
  }

  pub fn insert(&mut self, tool: impl Into<String>, executable: impl Into<String>) {
    self.0.insert(tool.into(), executable.into());
  }

  pub fn get(&self, tool: &str) -> Option<&str> {
    self.0.get(tool).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
    self.0.iter()
  }

  /// Resolve the executable for `tool`.
  ///
  /// An explicit override wins over the known toolchains.
  ///
  /// # Errors
  ///
  /// Returns [`CompileError::ToolchainNotConfigured`] if there is no override
  /// and `tool` is not known.
  pub fn resolve(&self, tool: &str, explicit: &Setting<String>) -> Result<String, CompileError> {
    if let Some(executable) = explicit.value() {
      debug!(tool, executable = %executable, "using explicit toolchain");
      return Ok(executable.clone());
    }

    self
      .get(tool)
      .map(str::to_string)
      .ok_or_else(|| CompileError::ToolchainNotConfigured { tool: tool.to_string() })
  }
}

impl From<BTreeMap<String, String>> for Toolchains {
  fn from(map: BTreeMap<String, String>) -> Self {
    Self(map)
  }
}
