//! Command line assembly for `helm` and `kubectl`.
//!
//! The argv of every step is a pure function of the compiled snapshot, the
//! runtime context and the working directory. Assembly happens at execution
//! time because `--dry-run`, `--debug` and the environment are only known then.
//!
//! Argument order is fixed and part of the contract:
//!
//! ```text
//! helm upgrade -i --wait [--debug] [--dry-run] [-f <v>]... [-n <ns>] <release> <chart...> [--version <v>] [--set <k>=<v>]...
//! helm uninstall --wait [--dry-run] <release>
//! kubectl apply --wait -f <workdir>/<env> [-f <workdir>/_srcs] [-n <ns>] [--dry-run=server] [-f <url>]...
//! kubectl delete --wait [-n <ns>] [--dry-run=server] -f <workdir>/<env> [-f <workdir>/_srcs] [-f <url>]...
//! helm pull -d <workdir> --untar --version <v> [--repo <repo>] <chart>
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::consts;
use crate::execute::ExecuteError;
use crate::placeholder::{self, Variables};
use crate::target::{ChartSource, HelmRelease, KubeManifests, PullPlan, RuntimeContext, ScriptAction};

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Look up the variables of the runtime environment.
fn environment<'a>(
  environments: &'a BTreeMap<String, Variables>,
  ctx: &RuntimeContext,
) -> Result<&'a Variables, ExecuteError> {
  environments
    .get(&ctx.env)
    .ok_or_else(|| ExecuteError::UnknownEnvironment {
      env: ctx.env.clone(),
      available: environments.keys().cloned().collect(),
    })
}

/// `helm upgrade -i` for the runtime environment.
///
/// # Errors
///
/// Fails if the environment is unknown or an override value references an
/// undefined variable.
pub fn helm_upgrade(release: &HelmRelease, ctx: &RuntimeContext, workdir: &Path) -> Result<Vec<String>, ExecuteError> {
  let vars = environment(&release.environments, ctx)?;

  let mut argv = vec![
    release.tool.clone(),
    "upgrade".to_string(),
    "-i".to_string(),
    "--wait".to_string(),
  ];
  if ctx.debug {
    argv.push("--debug".to_string());
  }
  if ctx.dry_run {
    argv.push("--dry-run".to_string());
  }
  for values in release.values.get(&ctx.env).into_iter().flatten() {
    argv.push("-f".to_string());
    argv.push(values.clone());
  }
  if let Some(namespace) = release.namespace.non_empty() {
    argv.push("-n".to_string());
    argv.push(namespace.to_string());
  }

  argv.push(release.release.clone());
  match &release.chart {
    ChartSource::Reference { .. } => argv.push(path_arg(&workdir.join(consts::CHART))),
    ChartSource::Repository { repo, chart } => {
      argv.push(format!("--repo={repo}"));
      argv.push(chart.clone());
    }
    ChartSource::Named { chart } => argv.push(chart.clone()),
  }

  if let Some(version) = release.version.non_empty() {
    argv.push("--version".to_string());
    argv.push(version.to_string());
  }
  for (key, value) in &release.args {
    argv.push("--set".to_string());
    argv.push(format!("{key}={}", placeholder::substitute(value, vars)?));
  }

  Ok(argv)
}

/// `helm uninstall`. The namespace travels in `HELM_NAMESPACE`.
pub fn helm_uninstall(release: &HelmRelease, ctx: &RuntimeContext) -> Vec<String> {
  let mut argv = vec![release.tool.clone(), "uninstall".to_string(), "--wait".to_string()];
  if ctx.dry_run {
    argv.push("--dry-run".to_string());
  }
  argv.push(release.release.clone());
  argv
}

/// `-f` for every built manifest directory: the environment, then the shared
/// sources when the build materializes them.
fn manifest_dirs(manifests: &KubeManifests, ctx: &RuntimeContext, workdir: &Path) -> Vec<String> {
  let mut argv = vec!["-f".to_string(), path_arg(&workdir.join(&ctx.env))];
  if manifests.shared {
    argv.push("-f".to_string());
    argv.push(path_arg(&workdir.join(consts::SHARED_SRCS)));
  }
  argv
}

/// `kubectl apply` of the built manifests and remote URLs.
pub fn kubectl_apply(
  manifests: &KubeManifests,
  ctx: &RuntimeContext,
  workdir: &Path,
) -> Result<Vec<String>, ExecuteError> {
  environment(&manifests.environments, ctx)?;

  let mut argv = vec![manifests.tool.clone(), "apply".to_string(), "--wait".to_string()];
  argv.extend(manifest_dirs(manifests, ctx, workdir));
  if let Some(namespace) = manifests.namespace.non_empty() {
    argv.push("-n".to_string());
    argv.push(namespace.to_string());
  }
  if ctx.dry_run {
    argv.push("--dry-run=server".to_string());
  }
  for url in &manifests.urls {
    argv.push("-f".to_string());
    argv.push(url.clone());
  }
  Ok(argv)
}

/// `kubectl delete` of the same set `kubectl_apply` applies.
pub fn kubectl_delete(
  manifests: &KubeManifests,
  ctx: &RuntimeContext,
  workdir: &Path,
) -> Result<Vec<String>, ExecuteError> {
  environment(&manifests.environments, ctx)?;

  let mut argv = vec![manifests.tool.clone(), "delete".to_string(), "--wait".to_string()];
  if let Some(namespace) = manifests.namespace.non_empty() {
    argv.push("-n".to_string());
    argv.push(namespace.to_string());
  }
  if ctx.dry_run {
    argv.push("--dry-run=server".to_string());
  }
  argv.extend(manifest_dirs(manifests, ctx, workdir));
  for url in &manifests.urls {
    argv.push("-f".to_string());
    argv.push(url.clone());
  }
  Ok(argv)
}

/// `helm pull` of a chart into the working directory.
pub fn helm_pull(plan: &PullPlan, workdir: &Path) -> Vec<String> {
  let mut argv = vec![
    plan.tool.clone(),
    "pull".to_string(),
    "-d".to_string(),
    path_arg(workdir),
    "--untar".to_string(),
    "--version".to_string(),
    plan.version.clone(),
  ];
  if let Some(repo) = plan.repo.non_empty() {
    argv.push("--repo".to_string());
    argv.push(repo.to_string());
  }
  argv.push(plan.chart.clone());
  argv
}

/// Assemble the argv of `action`. Copy-only builds run no tool.
pub fn assemble(action: &ScriptAction, ctx: &RuntimeContext, workdir: &Path) -> Result<Option<Vec<String>>, ExecuteError> {
  let argv = match action {
    ScriptAction::Build(_) => return Ok(None),
    ScriptAction::PullChart(plan) => helm_pull(plan, workdir),
    ScriptAction::HelmUpgrade(release) => helm_upgrade(release, ctx, workdir)?,
    ScriptAction::HelmUninstall(release) => helm_uninstall(release, ctx),
    ScriptAction::KubectlApply(manifests) => kubectl_apply(manifests, ctx, workdir)?,
    ScriptAction::KubectlDelete(manifests) => kubectl_delete(manifests, ctx, workdir)?,
  };
  Ok(Some(argv))
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;
  use crate::declaration::Setting;

  fn workdir() -> PathBuf {
    PathBuf::from("/work/api")
  }

  fn environments(names: &[&str]) -> BTreeMap<String, Variables> {
    names
      .iter()
      .map(|name| (name.to_string(), Variables::new().with("ENV", *name).with("REPLICAS", "3")))
      .collect()
  }

  fn release(chart: ChartSource) -> HelmRelease {
    HelmRelease {
      tool: "helm".to_string(),
      release: "api".to_string(),
      namespace: Setting::Value("prod".to_string()),
      chart,
      version: Setting::Value("1.2.0".to_string()),
      values: BTreeMap::from([(
        "prod".to_string(),
        vec!["base.yaml".to_string(), "prod.yaml".to_string()],
      )]),
      args: BTreeMap::new(),
      environments: environments(&["prod"]),
    }
  }

  fn manifests(namespace: Setting<String>) -> KubeManifests {
    KubeManifests {
      tool: "kubectl".to_string(),
      namespace,
      urls: vec!["https://example.com/crds.yaml".to_string()],
      shared: false,
      environments: environments(&["prod", "staging"]),
    }
  }

  // ==========================================================================
  // helm upgrade
  // ==========================================================================

  #[test]
  fn helm_upgrade_exact_order() {
    let chart = ChartSource::Named {
      chart: "<chart>".to_string(),
    };
    let ctx = RuntimeContext::new("prod").with_dry_run(true);

    let argv = helm_upgrade(&release(chart), &ctx, &workdir()).unwrap();

    assert_eq!(
      argv,
      vec![
        "helm",
        "upgrade",
        "-i",
        "--wait",
        "--dry-run",
        "-f",
        "base.yaml",
        "-f",
        "prod.yaml",
        "-n",
        "prod",
        "api",
        "<chart>",
        "--version",
        "1.2.0",
      ]
    );
  }

  #[test]
  fn helm_upgrade_debug_precedes_dry_run() {
    let chart = ChartSource::Named {
      chart: "myrepo/mychart".to_string(),
    };
    let ctx = RuntimeContext::new("prod").with_dry_run(true).with_debug(true);

    let argv = helm_upgrade(&release(chart), &ctx, &workdir()).unwrap();

    assert_eq!(&argv[3..6], ["--wait", "--debug", "--dry-run"]);
  }

  #[test]
  fn helm_upgrade_reference_chart_uses_workdir() {
    let chart = ChartSource::Reference {
      target: "//charts/api:chart".to_string(),
    };
    let argv = helm_upgrade(&release(chart), &RuntimeContext::new("prod"), &workdir()).unwrap();

    let position = argv.iter().position(|a| a == "api").unwrap();
    assert_eq!(argv[position + 1], "/work/api/chart");
  }

  #[test]
  fn helm_upgrade_repository_chart() {
    let chart = ChartSource::Repository {
      repo: "https://charts.example.com/repo".to_string(),
      chart: "mychart".to_string(),
    };
    let argv = helm_upgrade(&release(chart), &RuntimeContext::new("prod"), &workdir()).unwrap();

    let tail: Vec<_> = argv.iter().skip_while(|a| *a != "api").map(String::as_str).collect();
    assert_eq!(
      tail,
      vec!["api", "--repo=https://charts.example.com/repo", "mychart", "--version", "1.2.0"]
    );
  }

  #[test]
  fn helm_upgrade_overrides_sorted_and_interpolated() {
    let mut release = release(ChartSource::Named {
      chart: "api".to_string(),
    });
    release.version = Setting::Unset;
    release.args.insert("replicaCount".to_string(), "{REPLICAS}".to_string());
    release.args.insert("env".to_string(), "{ENV}".to_string());

    let argv = helm_upgrade(&release, &RuntimeContext::new("prod"), &workdir()).unwrap();

    assert_eq!(argv[argv.len() - 4..], ["--set", "env=prod", "--set", "replicaCount=3"]);
    assert!(!argv.contains(&"--version".to_string()));
  }

  #[test]
  fn helm_upgrade_undefined_override_variable() {
    let mut release = release(ChartSource::Named {
      chart: "api".to_string(),
    });
    release.args.insert("image.tag".to_string(), "{TAG}".to_string());

    let err = helm_upgrade(&release, &RuntimeContext::new("prod"), &workdir()).unwrap_err();

    assert!(matches!(err, ExecuteError::Placeholder(_)));
  }

  #[test]
  fn helm_upgrade_empty_namespace_is_omitted() {
    let mut release = release(ChartSource::Named {
      chart: "api".to_string(),
    });
    release.namespace = Setting::Value(String::new());

    let argv = helm_upgrade(&release, &RuntimeContext::new("prod"), &workdir()).unwrap();

    assert!(!argv.contains(&"-n".to_string()));
  }

  #[test]
  fn helm_upgrade_unknown_environment() {
    let release = release(ChartSource::Named {
      chart: "api".to_string(),
    });
    let err = helm_upgrade(&release, &RuntimeContext::new("qa"), &workdir()).unwrap_err();
    assert!(matches!(err, ExecuteError::UnknownEnvironment { ref env, .. } if env == "qa"));
  }

  // ==========================================================================
  // helm uninstall / pull
  // ==========================================================================

  #[test]
  fn helm_uninstall_argv() {
    let release = release(ChartSource::Named {
      chart: "api".to_string(),
    });
    assert_eq!(
      helm_uninstall(&release, &RuntimeContext::new("prod")),
      vec!["helm", "uninstall", "--wait", "api"]
    );
    assert_eq!(
      helm_uninstall(&release, &RuntimeContext::new("prod").with_dry_run(true)),
      vec!["helm", "uninstall", "--wait", "--dry-run", "api"]
    );
  }

  #[test]
  fn helm_pull_argv() {
    let plan = PullPlan {
      tool: "helm".to_string(),
      chart: "redis".to_string(),
      repo: Setting::Value("https://charts.bitnami.com/bitnami".to_string()),
      version: "18.1.0".to_string(),
    };
    assert_eq!(
      helm_pull(&plan, Path::new("/work/redis")),
      vec![
        "helm",
        "pull",
        "-d",
        "/work/redis",
        "--untar",
        "--version",
        "18.1.0",
        "--repo",
        "https://charts.bitnami.com/bitnami",
        "redis",
      ]
    );
  }

  // ==========================================================================
  // kubectl
  // ==========================================================================

  #[test]
  fn kubectl_apply_argv() {
    let ctx = RuntimeContext::new("staging").with_dry_run(true);
    let argv = kubectl_apply(&manifests(Setting::Value("edge".to_string())), &ctx, &workdir()).unwrap();

    assert_eq!(
      argv,
      vec![
        "kubectl",
        "apply",
        "--wait",
        "-f",
        "/work/api/staging",
        "-n",
        "edge",
        "--dry-run=server",
        "-f",
        "https://example.com/crds.yaml",
      ]
    );
  }

  #[test]
  fn kubectl_delete_argv() {
    let ctx = RuntimeContext::new("prod");
    let argv = kubectl_delete(&manifests(Setting::Unset), &ctx, &workdir()).unwrap();

    assert_eq!(
      argv,
      vec![
        "kubectl",
        "delete",
        "--wait",
        "-f",
        "/work/api/prod",
        "-f",
        "https://example.com/crds.yaml",
      ]
    );
  }

  #[test]
  fn kubectl_shared_sources_follow_environment() {
    let mut manifests = manifests(Setting::Value("edge".to_string()));
    manifests.shared = true;
    let ctx = RuntimeContext::new("prod");

    let apply = kubectl_apply(&manifests, &ctx, &workdir()).unwrap();
    let delete = kubectl_delete(&manifests, &ctx, &workdir()).unwrap();

    assert_eq!(
      apply,
      vec![
        "kubectl",
        "apply",
        "--wait",
        "-f",
        "/work/api/prod",
        "-f",
        "/work/api/_srcs",
        "-n",
        "edge",
        "-f",
        "https://example.com/crds.yaml",
      ]
    );
    assert_eq!(
      delete,
      vec![
        "kubectl",
        "delete",
        "--wait",
        "-n",
        "edge",
        "-f",
        "/work/api/prod",
        "-f",
        "/work/api/_srcs",
        "-f",
        "https://example.com/crds.yaml",
      ]
    );
  }

  #[test]
  fn kubectl_unknown_environment() {
    let err = kubectl_apply(&manifests(Setting::Unset), &RuntimeContext::new("qa"), &workdir()).unwrap_err();
    assert!(matches!(err, ExecuteError::UnknownEnvironment { .. }));
  }

  #[test]
  fn build_has_no_command() {
    let action = ScriptAction::Build(Default::default());
    assert!(assemble(&action, &RuntimeContext::new("prod"), &workdir()).unwrap().is_none());
  }
}
