//! Derived facts attached to a compiled target.
//!
//! The compiler records what it derived from a declaration (release, chart,
//! overrides, remote manifests) as a typed [`Metadata`] value. Hosts that can
//! only carry opaque strings across the graph get the same facts as a flat,
//! ordered `key=value` label list via [`Metadata::labels`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Typed metadata of a compiled target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub release: Option<String>,

  /// Present when the declaration set a namespace, even an empty one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub namespace: Option<String>,

  /// The chart identifier as declared.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub chart: Option<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  /// `--set` overrides, uninterpolated.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub args: BTreeMap<String, String>,

  /// Remote manifests, interpolated at compile time.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub urls: Vec<String>,

  /// Manifest directories applied by `kubectl`, relative to the working directory.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub apply_files: Vec<String>,
}

impl Metadata {
  /// Render the metadata as `key=value` labels.
  ///
  /// Order is fixed: release, namespace, chart, version, overrides (by key),
  /// URLs, apply files.
  pub fn labels(&self) -> Vec<String> {
    let mut labels = Vec::new();

    if let Some(release) = &self.release {
      labels.push(format!("meta:release={release}"));
    }
    if let Some(namespace) = &self.namespace {
      labels.push(format!("meta:namespace={namespace}"));
    }
    if let Some(chart) = &self.chart {
      labels.push(format!("meta:chart={chart}"));
    }
    if let Some(version) = &self.version {
      labels.push(format!("meta:version={version}"));
    }
    for (key, value) in &self.args {
      labels.push(format!("arg:{key}={value}"));
    }
    for url in &self.urls {
      labels.push(format!("url={url}"));
    }
    for file in &self.apply_files {
      labels.push(format!("apply_file={file}"));
    }

    labels
  }
}
