//! Lifecycle script execution.
//!
//! A compiled target carries its scripts as immutable snapshots. This module
//! runs them against a host-owned [`ScriptEnv`]:
//! - The *pre* step assembles the command line, records it in
//!   `KDEPLOY_DEBUG_CMD` and sets the namespace variable, without executing
//! - The *run* step materializes sources (build) or re-assembles the command
//!   line and hands it to an [`Executor`] (deploy, remove, chart pulls)
//!
//! Pre and run communicate only through [`ScriptEnv::vars`].
//!
//! Variables a target lists in `pass_env` or `secret_env` are looked up in
//! [`ScriptEnv::process_env`] and layered over every environment's variables
//! before either step, so they reach copied files, `--set` overrides and the
//! tool's environment alike. `ENV` and the namespace variables are never
//! replaced. A name missing from the process environment keeps its declared
//! value, if any.

pub mod copy;
pub mod process;
pub mod types;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::args;
use crate::consts;
use crate::placeholder::Variables;
use crate::target::{CompiledTarget, CopyMode, RuntimeContext, ScriptAction, ScriptKind};

pub use process::{Executor, Invocation, ProcessExecutor};
pub use types::{ExecuteError, ScriptError, ScriptState};

/// Outputs of a referenced target, as resolved by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceOutputs {
  /// The producing target's output directory.
  pub root: PathBuf,
  /// Output files relative to `root`. The first segment is the folder the
  /// producer wrote them under.
  pub paths: Vec<String>,
}

/// Host-owned runtime table of one target.
#[derive(Debug, Clone, Default)]
pub struct ScriptEnv {
  /// The target's working directory.
  pub workdir: PathBuf,
  /// The package source root that source globs are relative to.
  pub src_root: PathBuf,
  /// Reference -> its outputs.
  pub references: BTreeMap<String, ReferenceOutputs>,
  /// Variables written by pre steps and read by run steps.
  pub vars: Variables,
  /// The host process environment, read for `pass_env` and `secret_env`.
  pub process_env: Variables,
}

impl ScriptEnv {
  pub fn new(workdir: impl Into<PathBuf>, src_root: impl Into<PathBuf>) -> Self {
    Self {
      workdir: workdir.into(),
      src_root: src_root.into(),
      ..Default::default()
    }
  }

  pub fn with_reference(mut self, reference: impl Into<String>, outputs: ReferenceOutputs) -> Self {
    self.references.insert(reference.into(), outputs);
    self
  }

  pub fn with_process_env(mut self, vars: Variables) -> Self {
    self.process_env = vars;
    self
  }
}

/// The `pass_env` and `secret_env` variables present in the process
/// environment.
fn passed_variables(target: &CompiledTarget, env: &ScriptEnv) -> Variables {
  let mut passed = Variables::new();
  for name in &target.pass_env {
    if let Some(value) = env.process_env.get(name) {
      debug!(target = %target.name, name = %name, value = %value, "passing variable");
      passed.set(name.clone(), value);
    }
  }
  for name in &target.secret_env {
    if let Some(value) = env.process_env.get(name) {
      debug!(target = %target.name, name = %name, "passing secret variable");
      passed.set(name.clone(), value);
    }
  }
  passed
}

/// `action` with `passed` layered over every environment's variables.
fn with_passed<'a>(action: &'a ScriptAction, passed: &Variables) -> Cow<'a, ScriptAction> {
  if passed.is_empty() {
    return Cow::Borrowed(action);
  }

  let mut action = action.clone();
  match &mut action {
    ScriptAction::Build(plan) => {
      for set in plan.copies.iter_mut().filter(|set| set.mode == CopyMode::Interpolate) {
        set.vars.extend(passed);
      }
    }
    ScriptAction::HelmUpgrade(release) | ScriptAction::HelmUninstall(release) => {
      for vars in release.environments.values_mut() {
        vars.extend(passed);
      }
    }
    ScriptAction::KubectlApply(manifests) | ScriptAction::KubectlDelete(manifests) => {
      for vars in manifests.environments.values_mut() {
        vars.extend(passed);
      }
    }
    ScriptAction::PullChart(_) => {}
  }
  Cow::Owned(action)
}

/// The namespace variable an action's tool reads, and its value.
fn namespace_var(action: &ScriptAction) -> Option<(&'static str, &str)> {
  match action {
    ScriptAction::HelmUpgrade(release) | ScriptAction::HelmUninstall(release) => Some((
      consts::HELM_NAMESPACE_VAR,
      release.namespace.as_deref().unwrap_or_default(),
    )),
    ScriptAction::KubectlApply(manifests) | ScriptAction::KubectlDelete(manifests) => Some((
      consts::NAMESPACE_VAR,
      manifests.namespace.as_deref().unwrap_or_default(),
    )),
    ScriptAction::Build(_) | ScriptAction::PullChart(_) => None,
  }
}

/// Runs lifecycle scripts for one invocation of the host.
pub struct ScriptRunner<E> {
  executor: E,
  ctx: RuntimeContext,
  cancel: watch::Receiver<bool>,
}

impl<E: Executor> ScriptRunner<E> {
  /// A runner that is never cancelled.
  pub fn new(executor: E, ctx: RuntimeContext) -> Self {
    let (_, cancel) = watch::channel(false);
    Self { executor, ctx, cancel }
  }

  /// Cancel running tools once `cancel` turns true.
  pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn context(&self) -> &RuntimeContext {
    &self.ctx
  }

  pub fn executor(&self) -> &E {
    &self.executor
  }

  /// Pre step of `kind`: record the command line and the namespace.
  ///
  /// Scripts without a pre step are left untouched.
  pub fn pre(&self, target: &CompiledTarget, kind: ScriptKind, env: &mut ScriptEnv) -> Result<(), ExecuteError> {
    let script = target.script(kind).ok_or(ExecuteError::MissingScript(kind))?;
    if !script.has_pre() {
      return Ok(());
    }
    let passed = passed_variables(target, env);
    let action = with_passed(&script.action, &passed);

    if let Some((name, namespace)) = namespace_var(&action) {
      env.vars.set(name, namespace);
    }
    if let Some(argv) = args::assemble(&action, &self.ctx, &env.workdir)? {
      let cmd = argv.join(" ");
      debug!(target = %target.name, script = %kind, cmd = %cmd, "recorded command");
      env.vars.set(consts::DEBUG_CMD_VAR, cmd);
    }
    Ok(())
  }

  /// Run step of `kind`.
  pub async fn run(&self, target: &CompiledTarget, kind: ScriptKind, env: &ScriptEnv) -> Result<(), ExecuteError> {
    let script = target.script(kind).ok_or(ExecuteError::MissingScript(kind))?;
    let passed = passed_variables(target, env);
    let action = with_passed(&script.action, &passed);

    let cwd = match &*action {
      ScriptAction::Build(plan) => {
        tokio::fs::create_dir_all(&env.workdir).await?;
        for set in &plan.copies {
          copy::materialize(set, env).await?;
        }
        return Ok(());
      }
      ScriptAction::PullChart(_) => {
        // `helm pull --untar` refuses to overwrite an earlier pull
        if tokio::fs::try_exists(&env.workdir).await? {
          tokio::fs::remove_dir_all(&env.workdir).await?;
        }
        env.workdir.clone()
      }
      _ => env.workdir.join(&self.ctx.env),
    };

    let Some(argv) = args::assemble(&action, &self.ctx, &env.workdir)? else {
      return Ok(());
    };
    tokio::fs::create_dir_all(&cwd).await?;

    let mut vars = target.env.clone();
    vars.extend(&passed);
    vars.extend(&env.vars);
    let invocation = Invocation {
      argv,
      cwd,
      env: vars.into_inner(),
      target: target.name.clone(),
      phase: kind,
    };
    self.executor.run(&invocation, self.cancel.clone()).await
  }

  /// Run the full script: pre, then run.
  ///
  /// `observe` sees every state transition, starting with [`ScriptState::Pre`].
  pub async fn run_script(
    &self,
    target: &CompiledTarget,
    kind: ScriptKind,
    env: &mut ScriptEnv,
    mut observe: impl FnMut(ScriptState) + Send,
  ) -> Result<(), ScriptError> {
    let started = Instant::now();
    let wrap = |source| ScriptError {
      target: target.name.clone(),
      script: kind,
      source,
    };

    observe(ScriptState::Pre);
    if let Err(e) = self.pre(target, kind, env) {
      warn!(target = %target.name, script = %kind, error = %e, "pre step failed");
      observe(ScriptState::Failed);
      return Err(wrap(e));
    }

    observe(ScriptState::Running);
    info!(target = %target.name, script = %kind, env = %self.ctx.env, "running");
    match self.run(target, kind, env).await {
      Ok(()) => {
        info!(target = %target.name, script = %kind, elapsed = ?started.elapsed(), "succeeded");
        observe(ScriptState::Succeeded);
        Ok(())
      }
      Err(e) => {
        warn!(target = %target.name, script = %kind, error = %e, "failed");
        observe(ScriptState::Failed);
        Err(wrap(e))
      }
    }
  }
}
