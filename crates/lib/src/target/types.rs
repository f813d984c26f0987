use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::declaration::Setting;
use crate::placeholder::Variables;
use crate::target::Metadata;

/// The declaration kind a target was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
  Kubernetes,
  Helm,
  HelmChart,
}

impl TargetKind {
  pub fn as_str(self) -> &'static str {
    match self {
      TargetKind::Kubernetes => "kubernetes",
      TargetKind::Helm => "helm",
      TargetKind::HelmChart => "helm_chart",
    }
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The three named lifecycle procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
  Build,
  Deploy,
  Remove,
}

impl ScriptKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ScriptKind::Build => "build",
      ScriptKind::Deploy => "deploy",
      ScriptKind::Remove => "remove",
    }
  }
}

impl fmt::Display for ScriptKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ScriptKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "build" => Ok(ScriptKind::Build),
      "deploy" => Ok(ScriptKind::Deploy),
      "remove" => Ok(ScriptKind::Remove),
      other => Err(format!("unknown script: {other}")),
    }
  }
}

/// Source category -> ordered source paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceMap(BTreeMap<String, Vec<String>>);

impl SourceMap {
  pub fn new() -> Self {
    Self(BTreeMap::new())
  }

  pub fn insert(&mut self, category: impl Into<String>, paths: Vec<String>) {
    self.0.insert(category.into(), paths);
  }

  /// Append to a category, creating it if needed.
  pub fn push(&mut self, category: &str, path: String) {
    self.0.entry(category.to_string()).or_default().push(path);
  }

  pub fn get(&self, category: &str) -> Option<&[String]> {
    self.0.get(category).map(Vec::as_slice)
  }

  pub fn contains(&self, category: &str) -> bool {
    self.0.contains_key(category)
  }

  pub fn categories(&self) -> impl Iterator<Item = &String> {
    self.0.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
    self.0.iter()
  }

  pub fn extend(&mut self, other: SourceMap) {
    for (category, paths) in other.0 {
      self.0.entry(category).or_default().extend(paths);
    }
  }
}

/// Execution-time parameters supplied by the host for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeContext {
  /// Selected environment.
  pub env: String,
  pub dry_run: bool,
  pub debug: bool,
}

impl RuntimeContext {
  pub fn new(env: impl Into<String>) -> Self {
    Self {
      env: env.into(),
      dry_run: false,
      debug: false,
    }
  }

  pub fn with_dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  pub fn with_debug(mut self, debug: bool) -> Self {
    self.debug = debug;
    self
  }
}

/// How a copy set is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
  /// Copy each file, interpolating its contents.
  Interpolate,
  /// Copy each file byte for byte.
  Raw,
  /// Link the outputs of a referenced target, dropping their first segment.
  Link,
}

/// One category of sources and where the build puts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySet {
  pub category: String,
  /// Source globs (or references, for [`CopyMode::Link`]).
  pub sources: Vec<String>,
  /// Directory, relative to the source root, that copied layouts are
  /// relative to. Empty means the source root itself.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub root: String,
  /// Destination, relative to the working directory. Empty means the root.
  pub dest: String,
  /// Drop the source layout and place every file directly under `dest`.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub flatten: bool,
  pub mode: CopyMode,
  /// Variables used for [`CopyMode::Interpolate`].
  #[serde(default, skip_serializing_if = "Variables::is_empty")]
  pub vars: Variables,
}

/// Snapshot for a build that materializes sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPlan {
  pub copies: Vec<CopySet>,
}

/// Snapshot for a build that pulls a chart from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullPlan {
  pub tool: String,
  pub chart: String,
  pub repo: Setting<String>,
  pub version: String,
}

/// Where `helm` finds the chart of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChartSource {
  /// Materialized by the build under `<workdir>/chart`.
  Reference { target: String },
  /// An HTTP(S) chart URL split into repository and chart name.
  Repository { repo: String, chart: String },
  /// Passed to `helm` verbatim (`repo/chart`, a local path, an OCI ref).
  Named { chart: String },
}

/// Snapshot for Helm deploy/remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmRelease {
  pub tool: String,
  pub release: String,
  pub namespace: Setting<String>,
  pub chart: ChartSource,
  pub version: Setting<String>,
  /// Environment -> values files, interpolated for that environment.
  pub values: BTreeMap<String, Vec<String>>,
  /// `--set` overrides, interpolated when the command is assembled.
  pub args: BTreeMap<String, String>,
  /// Environment -> variables.
  pub environments: BTreeMap<String, Variables>,
}

/// Snapshot for Kubernetes deploy/remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeManifests {
  pub tool: String,
  pub namespace: Setting<String>,
  /// Remote manifests applied after the built ones.
  pub urls: Vec<String>,
  /// Whether the build materializes `<workdir>/_srcs`, applied after the
  /// environment directory.
  #[serde(default)]
  pub shared: bool,
  /// Environment -> variables.
  pub environments: BTreeMap<String, Variables>,
}

/// What a lifecycle script does, with everything it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum ScriptAction {
  Build(BuildPlan),
  PullChart(PullPlan),
  HelmUpgrade(HelmRelease),
  HelmUninstall(HelmRelease),
  KubectlApply(KubeManifests),
  KubectlDelete(KubeManifests),
}

impl ScriptAction {
  /// Tool invoked by the action, if any.
  pub fn tool(&self) -> Option<&str> {
    match self {
      ScriptAction::Build(_) => None,
      ScriptAction::PullChart(plan) => Some(&plan.tool),
      ScriptAction::HelmUpgrade(release) | ScriptAction::HelmUninstall(release) => Some(&release.tool),
      ScriptAction::KubectlApply(manifests) | ScriptAction::KubectlDelete(manifests) => Some(&manifests.tool),
    }
  }
}

/// A named procedure of a compiled target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleScript {
  /// Targets whose same-phase script must finish first.
  pub deps: Vec<String>,
  pub action: ScriptAction,
}

impl LifecycleScript {
  pub fn new(deps: Vec<String>, action: ScriptAction) -> Self {
    Self { deps, action }
  }

  /// Deploy and remove record their command line before running.
  pub fn has_pre(&self) -> bool {
    !matches!(self.action, ScriptAction::Build(_) | ScriptAction::PullChart(_))
  }
}

/// The compiler's output for one declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledTarget {
  pub name: String,
  pub kind: TargetKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// Tool name -> executable.
  pub tools: BTreeMap<String, String>,
  pub srcs: SourceMap,
  pub outs: Vec<String>,
  pub labels: Vec<String>,
  pub metadata: Metadata,
  /// Static variables, including the namespace variable.
  pub env: Variables,
  /// Names of the environments this target was expanded for.
  pub environments: Vec<String>,
  /// Variables read from the host process environment when a script runs.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub pass_env: Vec<String>,
  /// Like `pass_env`, but the values are never logged.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub secret_env: Vec<String>,
  pub scripts: BTreeMap<ScriptKind, LifecycleScript>,
}

impl CompiledTarget {
  pub fn script(&self, kind: ScriptKind) -> Option<&LifecycleScript> {
    self.scripts.get(&kind)
  }

  /// Build-phase dependencies.
  pub fn build_deps(&self) -> &[String] {
    self.script(ScriptKind::Build).map(|s| s.deps.as_slice()).unwrap_or_default()
  }
}
