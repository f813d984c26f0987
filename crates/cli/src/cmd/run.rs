//! Implementation of `kdeploy build`, `kdeploy deploy` and `kdeploy remove`.
//!
//! Runs one lifecycle script of one target. Dependencies are not scheduled:
//! a referenced chart must have been built beforehand.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;
use kdeploy_lib::config::Config;
use kdeploy_lib::execute::{ProcessExecutor, ScriptRunner};
use kdeploy_lib::target::{CompiledTarget, RuntimeContext, ScriptKind};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::host::Package;
use crate::output::{format_duration, print_info, print_state, print_success};

#[derive(Args, Debug)]
pub struct RunArgs {
  /// Target name
  pub target: String,

  /// Environment to run for (defaults to the target's only environment)
  #[arg(short, long)]
  pub env: Option<String>,

  /// Ask the tool for a dry run
  #[arg(long)]
  pub dry_run: bool,

  /// Pass --debug to helm
  #[arg(long)]
  pub debug: bool,
}

/// Pick the environment for `kind`.
///
/// Builds materialize every environment, so any declared one will do.
fn select_environment(target: &CompiledTarget, kind: ScriptKind, requested: Option<&str>) -> Result<String> {
  if let Some(env) = requested {
    return Ok(env.to_string());
  }
  match target.environments.as_slice() {
    [only] => Ok(only.clone()),
    [first, ..] if kind == ScriptKind::Build => Ok(first.clone()),
    [] => Ok(String::new()),
    many => bail!(
      "'{}' has several environments, pick one with --env ({})",
      target.name,
      many.join(", ")
    ),
  }
}

pub fn cmd_run(kind: ScriptKind, file: &Path, config: &Config, args: &RunArgs) -> Result<()> {
  let package = Package::load(file, config)?;
  let target = package.target(&args.target)?;
  if target.script(kind).is_none() {
    bail!("'{}' ({}) has no {} script", target.name, target.kind, kind);
  }

  let env_name = select_environment(target, kind, args.env.as_deref())?;
  let ctx = RuntimeContext::new(&env_name)
    .with_dry_run(args.dry_run)
    .with_debug(args.debug);

  std::fs::create_dir_all(&config.work_root)
    .with_context(|| format!("Failed to create work root: {}", config.work_root.display()))?;
  let work_root = dunce::canonicalize(&config.work_root)
    .with_context(|| format!("Failed to resolve work root: {}", config.work_root.display()))?;
  let mut env = package.script_env(target, &work_root)?;

  print_info(&format!("{} {} ({})", kind, target.name, env_name));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  rt.block_on(async {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, stopping");
        let _ = cancel_tx.send(true);
      }
    });

    let runner = ScriptRunner::new(ProcessExecutor, ctx).with_cancel(cancel_rx);
    runner
      .run_script(target, kind, &mut env, |state| print_state(&target.name, state))
      .await
  })?;

  info!(target = %target.name, workdir = ?env.workdir, "done");
  print_success(&format!(
    "{} of {} finished in {}",
    kind,
    target.name,
    format_duration(started.elapsed())
  ));
  Ok(())
}
