//! Per-environment expansion of sources.
//!
//! Every declared environment gets its own copy of each source list: the
//! source strings are interpolated with that environment's variables and filed
//! under a category named after the environment (`<env>` for sources,
//! `values_<env>` for values files). Static sources without any placeholder
//! are still duplicated into every environment, so each environment directory
//! is self-contained after the build.
//!
//! Expanded paths must stay inside the package: absolute paths and `..`
//! segments are rejected, since their copies would leave the environment
//! directory.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use tracing::debug;

use crate::compile::CompileError;
use crate::consts;
use crate::declaration::Environment;
use crate::placeholder::{self, ENV_VAR, Variables};
use crate::target::SourceMap;

/// Interpolate `input`, reporting failures with the input and environment.
pub(crate) fn interpolate(input: &str, vars: &Variables, environment: Option<&str>) -> Result<String, CompileError> {
  placeholder::substitute(input, vars).map_err(|error| CompileError::Interpolation {
    input: input.to_string(),
    environment: environment.map(str::to_string),
    error,
  })
}

fn validate_name(name: &str) -> Result<(), CompileError> {
  let invalid = |reason: &str| CompileError::InvalidEnvironment {
    name: name.to_string(),
    reason: reason.to_string(),
  };

  if name.is_empty() || name == "." || name == ".." {
    return Err(invalid("not a directory name"));
  }
  if name.contains('/') || name.contains('\\') {
    return Err(invalid("must be a single path segment"));
  }
  if consts::is_reserved_category(name) {
    return Err(invalid("collides with a reserved source category"));
  }
  Ok(())
}

/// Reject paths whose copy would leave the destination directory.
pub(crate) fn validate_source(path: &str) -> Result<(), CompileError> {
  let invalid = |reason: &str| CompileError::InvalidSource {
    path: path.to_string(),
    reason: reason.to_string(),
  };

  let path_ref = Path::new(path);
  if path_ref.is_absolute() || path.starts_with(['/', '\\']) {
    return Err(invalid("must be relative to the package"));
  }
  if path_ref.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
    return Err(invalid("must not leave the package"));
  }
  Ok(())
}

/// Check names listed in `pass_env` or `secret_env`.
pub(crate) fn validate_passed<'a>(names: impl IntoIterator<Item = &'a String>) -> Result<(), CompileError> {
  let reserved = [
    ENV_VAR,
    consts::NAMESPACE_VAR,
    consts::HELM_NAMESPACE_VAR,
    consts::DEBUG_CMD_VAR,
  ];
  match names.into_iter().find(|name| reserved.contains(&name.as_str())) {
    Some(name) => Err(CompileError::ReservedVariable(name.clone())),
    None => Ok(()),
  }
}

/// Expands source lists across the environments of one declaration.
#[derive(Debug, Clone)]
pub struct EnvironmentExpander {
  environments: BTreeMap<String, Variables>,
}

impl EnvironmentExpander {
  /// Compute the variables of every environment.
  ///
  /// Each environment sees `base`, then its own `vars`, then `ENV` bound to
  /// its name. Without declared environments a single `default` environment
  /// is used.
  ///
  /// # Errors
  ///
  /// Returns [`CompileError::InvalidEnvironment`] for names that are not a
  /// single path segment or collide with a reserved category.
  pub fn new(base: &Variables, declared: &BTreeMap<String, Environment>) -> Result<Self, CompileError> {
    let mut environments = BTreeMap::new();

    if declared.is_empty() {
      let vars = base.clone().with(ENV_VAR, consts::DEFAULT_ENVIRONMENT);
      environments.insert(consts::DEFAULT_ENVIRONMENT.to_string(), vars);
    }

    for (name, environment) in declared {
      validate_name(name)?;
      let mut vars = base.clone();
      vars.extend(&environment.vars);
      vars.set(ENV_VAR, name.as_str());
      environments.insert(name.clone(), vars);
    }

    Ok(Self { environments })
  }

  /// Environment names, sorted.
  pub fn names(&self) -> Vec<String> {
    self.environments.keys().cloned().collect()
  }

  pub fn variables(&self) -> &BTreeMap<String, Variables> {
    &self.environments
  }

  /// Expand `sources` once per environment into `category(env)`.
  ///
  /// Every environment gets its category, even when `sources` is empty.
  pub fn expand_with(&self, sources: &[String], category: impl Fn(&str) -> String) -> Result<SourceMap, CompileError> {
    let mut srcs = SourceMap::new();

    for (env, vars) in &self.environments {
      let mut expanded = Vec::with_capacity(sources.len());
      for source in sources {
        let path = interpolate(source, vars, Some(env))?;
        validate_source(&path)?;
        expanded.push(path);
      }
      debug!(env = %env, count = expanded.len(), "expanded sources");
      srcs.insert(category(env), expanded);
    }

    Ok(srcs)
  }

  /// Expand manifest sources: category `<env>`, output `<env>/**`.
  pub fn expand(&self, sources: &[String]) -> Result<(SourceMap, Vec<String>), CompileError> {
    let srcs = self.expand_with(sources, str::to_string)?;
    let outs = self.environments.keys().map(|env| format!("{env}/**")).collect();
    Ok((srcs, outs))
  }

  /// Expand values files: category `values_<env>`.
  pub fn expand_values(&self, values_files: &[String]) -> Result<SourceMap, CompileError> {
    self.expand_with(values_files, consts::values_category)
  }
}

/// Interpolate environment-independent sources with the base variables.
pub fn expand_shared(shared: &[String], base: &Variables) -> Result<Vec<String>, CompileError> {
  shared
    .iter()
    .map(|source| {
      let path = interpolate(source, base, None)?;
      validate_source(&path)?;
      Ok(path)
    })
    .collect()
}
