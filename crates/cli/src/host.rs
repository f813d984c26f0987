//! The reference host: build files, working directories and reference outputs.
//!
//! A build file is a YAML list of declarations, each tagged with its `kind`:
//!
//! ```yaml
//! - kind: helm_chart
//!   name: api-chart
//!   path: charts/api
//! - kind: helm
//!   name: api
//!   chart: ":api-chart"
//!   release_name: api
//! ```
//!
//! Every target gets `<work_root>/<name>` as its working directory. A reference
//! such as `:api-chart` resolves to the files that target's build left there.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use glob::Pattern;
use kdeploy_lib::compile::{CompileContext, Registry};
use kdeploy_lib::config::Config;
use kdeploy_lib::execute::{ReferenceOutputs, ScriptEnv};
use kdeploy_lib::placeholder::Variables;
use kdeploy_lib::target::CompiledTarget;
use tracing::debug;
use walkdir::WalkDir;

/// Build file looked up in the current directory.
pub const BUILD_FILE: &str = "kdeploy.yaml";

/// A compiled build file.
#[derive(Debug)]
pub struct Package {
  /// Directory of the build file. Source globs are relative to it.
  pub src_root: PathBuf,
  pub targets: Vec<CompiledTarget>,
}

impl Package {
  /// Read and compile every declaration in `path`.
  pub fn load(path: &Path, config: &Config) -> Result<Self> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read build file: {}", path.display()))?;
    let declarations: Vec<serde_yaml::Mapping> =
      serde_yaml::from_str(&content).with_context(|| format!("Failed to parse build file: {}", path.display()))?;

    let canonical = dunce::canonicalize(path).with_context(|| format!("Failed to resolve {}", path.display()))?;
    let src_root = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

    let registry = Registry::builtin();
    let ctx = CompileContext::new(&config.toolchains).with_vars(config.vars.clone());

    let mut targets = Vec::new();
    for (index, mut declaration) in declarations.into_iter().enumerate() {
      let kind = declaration
        .remove("kind")
        .and_then(|kind| kind.as_str().map(str::to_string))
        .ok_or_else(|| anyhow!("declaration #{} has no kind", index + 1))?;
      let compiled = registry.get_targets(&kind, serde_yaml::Value::Mapping(declaration), &ctx)?;
      targets.extend(compiled);
    }

    if let Some(duplicate) = targets
      .iter()
      .enumerate()
      .find(|(i, t)| targets[..*i].iter().any(|other| other.name == t.name))
      .map(|(_, t)| &t.name)
    {
      bail!("target '{}' is declared more than once", duplicate);
    }

    debug!(path = ?path, count = targets.len(), "loaded build file");
    Ok(Self { src_root, targets })
  }

  pub fn target(&self, name: &str) -> Result<&CompiledTarget> {
    self.targets.iter().find(|t| t.name == name).ok_or_else(|| {
      let known: Vec<_> = self.targets.iter().map(|t| t.name.as_str()).collect();
      anyhow!("unknown target '{}' (known: {})", name, known.join(", "))
    })
  }

  /// The runtime table for `target`, with its build dependencies resolved.
  pub fn script_env(&self, target: &CompiledTarget, work_root: &Path) -> Result<ScriptEnv> {
    let mut env = ScriptEnv::new(work_root.join(&target.name), &self.src_root).with_process_env(process_env());
    for reference in target.build_deps() {
      let producer = self.target(reference_name(reference))?;
      let outputs = reference_outputs(producer, work_root)
        .with_context(|| format!("Failed to resolve '{}' for '{}'", reference, target.name))?;
      env.references.insert(reference.clone(), outputs);
    }
    Ok(env)
  }
}

/// This process's environment. Entries that are not valid UTF-8 are skipped.
fn process_env() -> Variables {
  let vars: BTreeMap<String, String> = std::env::vars_os()
    .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
    .collect();
  Variables::from(vars)
}

/// The target name a reference points at.
///
/// `//charts/api:api-chart` and `:api-chart` name `api-chart`; `//charts/api`
/// names its last package segment.
pub fn reference_name(reference: &str) -> &str {
  match reference.rsplit_once(':') {
    Some((_, name)) => name,
    None => reference.trim_end_matches('/').rsplit('/').next().unwrap_or(reference),
  }
}

/// Files under the producer's working directory that match its outputs.
pub fn reference_outputs(producer: &CompiledTarget, work_root: &Path) -> Result<ReferenceOutputs> {
  let root = work_root.join(&producer.name);
  if !root.is_dir() {
    bail!("'{}' has not been built (run `kdeploy build {}`)", producer.name, producer.name);
  }

  let patterns = producer
    .outs
    .iter()
    .map(|out| Pattern::new(out).with_context(|| format!("Invalid output pattern: {}", out)))
    .collect::<Result<Vec<_>>>()?;

  let mut paths = Vec::new();
  for entry in WalkDir::new(&root).sort_by_file_name() {
    let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(relative) = entry.path().strip_prefix(&root) else {
      continue;
    };
    let relative = relative
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    if patterns.iter().any(|p| p.matches(&relative)) {
      paths.push(relative);
    }
  }

  debug!(target = %producer.name, count = paths.len(), "resolved outputs");
  Ok(ReferenceOutputs { root, paths })
}
