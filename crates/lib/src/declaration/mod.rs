//! User-authored deployment declarations.
//!
//! Declarations arrive already deserialized from the host's build file. Each
//! kind (`kubernetes`, `helm`, `helm_chart`) embeds the [`Common`] fields that
//! every deployable unit shares.
//!
//! # Example (YAML)
//!
//! ```yaml
//! kind: helm
//! name: api
//! chart: //charts/api:chart
//! release_name: api
//! namespace: backend
//! values_files: [values/base.yaml, "values/{ENV}.yaml"]
//! environments:
//!   staging: {}
//!   prod:
//!     vars: { REPLICAS: "3" }
//! ```

mod setting;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use setting::Setting;

/// A named deployment environment.
///
/// The name is the key in [`Common::environments`]; besides the declared
/// `vars`, the reserved `ENV` variable is bound to it during expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
  #[serde(default)]
  pub vars: BTreeMap<String, String>,
}

/// Fields shared by `kubernetes` and `helm` declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Common {
  /// Name of the compiled target.
  pub name: String,

  #[serde(default, rename = "desc")]
  pub description: Setting<String>,

  /// Labels copied onto the compiled target ahead of the derived metadata.
  #[serde(default)]
  pub labels: Vec<String>,

  /// Build-phase dependencies.
  #[serde(default)]
  pub deps: Vec<String>,

  /// Deploy-phase dependencies, e.g. a namespace that must be deployed first.
  #[serde(default)]
  pub deploy_deps: Vec<String>,

  /// Static variables, available to every environment.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Variables read from the host process environment when a script runs.
  /// A value found there replaces the declared one.
  #[serde(default)]
  pub pass_env: Vec<String>,

  /// Same as `pass_env`, but the values never appear in logs.
  #[serde(default)]
  pub secret_env: Vec<String>,

  #[serde(default)]
  pub environments: BTreeMap<String, Environment>,

  /// Sources copied into every environment's output.
  #[serde(default)]
  pub srcs: Vec<String>,

  /// Sources copied once, outside any environment.
  #[serde(default)]
  pub shared_srcs: Vec<String>,

  /// Explicit executable, overriding the known toolchains.
  #[serde(default)]
  pub toolchain: Setting<String>,

  #[serde(default)]
  pub namespace: Setting<String>,
}

/// A set of raw Kubernetes manifests applied with `kubectl`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesDecl {
  #[serde(flatten)]
  pub common: Common,

  /// Remote manifests applied next to the built ones.
  #[serde(default)]
  pub urls: Vec<String>,
}

/// A Helm release installed with `helm upgrade -i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmDecl {
  #[serde(flatten)]
  pub common: Common,

  #[serde(default)]
  pub values_files: Vec<String>,

  /// A target reference, an `http(s)` URL or a `repo/chart` name.
  pub chart: String,

  pub release_name: String,

  #[serde(default)]
  pub version: Setting<String>,

  /// `--set` overrides. Values may reference environment variables.
  #[serde(default)]
  pub args: BTreeMap<String, String>,
}

/// A Helm chart made available to other targets, either from a local
/// directory or pulled from a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmChartDecl {
  pub name: String,

  #[serde(default, rename = "desc")]
  pub description: Setting<String>,

  #[serde(default)]
  pub labels: Vec<String>,

  #[serde(default)]
  pub deps: Vec<String>,

  #[serde(default)]
  pub repo: Setting<String>,

  #[serde(default)]
  pub chart: String,

  #[serde(default)]
  pub version: Setting<String>,

  /// Local chart directory. When set, nothing is pulled.
  #[serde(default)]
  pub path: Setting<String>,

  #[serde(default)]
  pub toolchain: Setting<String>,
}
