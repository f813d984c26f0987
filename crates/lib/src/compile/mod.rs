//! Declaration compilation.
//!
//! This module turns declarations into [`CompiledTarget`]s. It handles:
//! - Toolchain resolution against the known toolchains
//! - Reference classification of charts
//! - Per-environment expansion of sources and values files
//! - Synthesis of the build, deploy and remove scripts
//!
//! Compilation is synchronous and touches no shared mutable state, so the host
//! may compile independent declarations concurrently.
//!
//! # Submodules
//!
//! - [`environment`] - per-environment source expansion
//! - [`scripts`] - build plans shared by every kind
//! - [`kubernetes`], [`helm`], [`chart`] - one compiler per declaration kind

pub mod chart;
pub mod environment;
pub mod helm;
pub mod kubernetes;
pub mod scripts;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::declaration::{Common, HelmChartDecl, HelmDecl, KubernetesDecl};
use crate::placeholder::{PlaceholderError, Variables};
use crate::reference::{ReferenceSyntax, TargetReference};
use crate::target::{CompiledTarget, TargetKind};
use crate::toolchain::Toolchains;

pub use environment::EnvironmentExpander;

/// Errors that can occur while compiling a declaration.
#[derive(Debug, Error)]
pub enum CompileError {
  /// No explicit toolchain and the tool is not among the known toolchains.
  #[error("{tool} toolchain is not configured")]
  ToolchainNotConfigured { tool: String },

  /// A source, values file or URL is not a valid template.
  #[error("interpolating '{input}'{}: {error}", for_environment(.environment))]
  Interpolation {
    input: String,
    environment: Option<String>,
    #[source]
    error: PlaceholderError,
  },

  #[error("invalid environment '{name}': {reason}")]
  InvalidEnvironment { name: String, reason: String },

  /// A source or values path that would land outside its destination.
  #[error("invalid source '{path}': {reason}")]
  InvalidSource { path: String, reason: String },

  /// A variable set by the compiler cannot be passed in from the host.
  #[error("variable '{0}' is reserved and cannot be passed from the environment")]
  ReservedVariable(String),

  #[error("missing required field '{0}'")]
  MissingField(&'static str),

  #[error("invalid declaration: {0}")]
  Declaration(#[from] serde_yaml::Error),

  #[error("unknown target kind: {0}")]
  UnknownKind(String),

  /// Any of the above, with the identity of the declaration being compiled.
  #[error("compiling {kind} target '{name}': {source}")]
  Target {
    kind: String,
    name: String,
    #[source]
    source: Box<CompileError>,
  },
}

fn for_environment(environment: &Option<String>) -> String {
  match environment {
    Some(env) => format!(" for environment '{env}'"),
    None => String::new(),
  }
}

impl CompileError {
  /// Attach the identity of the declaration being compiled.
  pub fn in_target(self, kind: &str, name: &str) -> Self {
    match self {
      already @ CompileError::Target { .. } => already,
      other => CompileError::Target {
        kind: kind.to_string(),
        name: name.to_string(),
        source: Box::new(other),
      },
    }
  }

  /// The innermost error, without target context.
  pub fn root(&self) -> &CompileError {
    match self {
      CompileError::Target { source, .. } => source.root(),
      other => other,
    }
  }
}

/// Host-supplied collaborators for compilation.
pub struct CompileContext<'a> {
  pub toolchains: &'a Toolchains,
  pub references: &'a dyn ReferenceSyntax,
  /// Variables visible to every declaration (e.g. set by the build file).
  pub vars: Variables,
}

impl<'a> CompileContext<'a> {
  /// A context using the default reference syntax.
  pub fn new(toolchains: &'a Toolchains) -> Self {
    Self {
      toolchains,
      references: &TargetReference,
      vars: Variables::new(),
    }
  }

  pub fn with_references(mut self, references: &'a dyn ReferenceSyntax) -> Self {
    self.references = references;
    self
  }

  pub fn with_vars(mut self, vars: Variables) -> Self {
    self.vars = vars;
    self
  }

  /// Variables shared by all environments of `common`.
  ///
  /// Host variables, then the declaration's `env`, then `namespace_var`
  /// bound to the namespace (empty when unset).
  pub(crate) fn base_variables(&self, common: &Common, namespace_var: &str) -> Variables {
    let mut vars = self.vars.clone();
    vars.extend(&common.env);
    vars.set(namespace_var, common.namespace.as_deref().unwrap_or_default());
    vars
  }
}

/// A declaration kind the host can compile.
pub trait TargetDeclaration: DeserializeOwned {
  const KIND: TargetKind;

  fn name(&self) -> &str;

  /// Compile the declaration. Errors are not yet wrapped with target identity.
  fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError>;

  /// Compile the declaration into the targets the host should register.
  fn get_targets(&self, ctx: &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError> {
    info!(kind = %Self::KIND, target = self.name(), "compiling");
    let targets = self
      .compile(ctx)
      .map_err(|e| e.in_target(Self::KIND.as_str(), self.name()))?;
    debug!(kind = %Self::KIND, target = self.name(), count = targets.len(), "compiled");
    Ok(targets)
  }
}

/// Deserializes a raw declaration and compiles it.
pub type Constructor = fn(serde_yaml::Value, &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError>;

fn construct<T: TargetDeclaration>(
  value: serde_yaml::Value,
  ctx: &CompileContext<'_>,
) -> Result<Vec<CompiledTarget>, CompileError> {
  let name = value
    .get("name")
    .and_then(serde_yaml::Value::as_str)
    .unwrap_or("<unnamed>")
    .to_string();
  let declaration: T = serde_yaml::from_value(value).map_err(|e| CompileError::from(e).in_target(T::KIND.as_str(), &name))?;
  declaration.get_targets(ctx)
}

/// Declaration kind -> constructor.
///
/// Built once at process start and consulted by the host when parsing a
/// build file.
#[derive(Clone, Default)]
pub struct Registry {
  constructors: BTreeMap<String, Constructor>,
}

impl Registry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with `kubernetes`, `helm` and `helm_chart`.
  pub fn builtin() -> Self {
    let mut registry = Self::new();
    registry.register_declaration::<KubernetesDecl>();
    registry.register_declaration::<HelmDecl>();
    registry.register_declaration::<HelmChartDecl>();
    registry
  }

  pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) {
    self.constructors.insert(kind.into(), constructor);
  }

  pub fn register_declaration<T: TargetDeclaration>(&mut self) {
    self.register(T::KIND.as_str(), construct::<T>);
  }

  pub fn kinds(&self) -> impl Iterator<Item = &str> {
    self.constructors.keys().map(String::as_str)
  }

  pub fn contains(&self, kind: &str) -> bool {
    self.constructors.contains_key(kind)
  }

  /// Compile a raw declaration of `kind`.
  ///
  /// # Errors
  ///
  /// Returns [`CompileError::UnknownKind`] for unregistered kinds, otherwise
  /// the constructor's error wrapped with the declaration's identity.
  pub fn get_targets(
    &self,
    kind: &str,
    declaration: serde_yaml::Value,
    ctx: &CompileContext<'_>,
  ) -> Result<Vec<CompiledTarget>, CompileError> {
    let constructor = self
      .constructors
      .get(kind)
      .ok_or_else(|| CompileError::UnknownKind(kind.to_string()))?;
    constructor(declaration, ctx)
  }
}

impl std::fmt::Debug for Registry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registry").field("kinds", &self.kinds().collect::<Vec<_>>()).finish()
  }
}
