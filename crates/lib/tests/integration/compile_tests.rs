//! Compilation of YAML declarations through the registry.

use std::path::Path;

use kdeploy_lib::args;
use kdeploy_lib::compile::{CompileContext, CompileError, Registry};
use kdeploy_lib::target::{ChartSource, RuntimeContext, ScriptAction, ScriptKind, TargetKind};
use kdeploy_lib::toolchain::Toolchains;

use super::common::{compile, toolchains};

const HELM_API: &str = r#"
name: api
chart: myrepo/mychart
release_name: api
namespace: prod
version: 1.2.0
values_files: [base.yaml, "{ENV}.yaml"]
environments:
  prod: {}
  staging: {}
"#;

#[test]
fn helm_deploy_command_line_is_exact() {
  let target = compile("helm", HELM_API);
  let ScriptAction::HelmUpgrade(release) = &target.script(ScriptKind::Deploy).unwrap().action else {
    panic!("deploy should upgrade the release");
  };

  let argv = args::helm_upgrade(release, &RuntimeContext::new("prod").with_dry_run(true), Path::new("/work/api")).unwrap();

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
      "myrepo/mychart",
      "--version",
      "1.2.0",
    ]
  );
}

#[test]
fn every_environment_gets_its_own_values() {
  let target = compile("helm", HELM_API);

  let prod = target.srcs.get("values_prod").unwrap();
  let staging = target.srcs.get("values_staging").unwrap();
  assert_eq!(prod, ["prod/base.yaml", "prod/prod.yaml"]);
  assert_eq!(staging, ["staging/base.yaml", "staging/staging.yaml"]);
  assert_eq!(target.environments, vec!["prod", "staging"]);
  assert_eq!(target.outs, vec!["prod/**", "staging/**"]);

  for path in prod {
    assert!(!staging.contains(path), "{path} is shared");
    assert!(!target.outs.contains(path), "{path} is also an output");
  }
}

#[test]
fn escaping_values_file_fails_to_compile() {
  let toolchains = toolchains();
  let ctx = CompileContext::new(&toolchains);
  let yaml = HELM_API.replace("base.yaml", "../common.yaml");
  let declaration = serde_yaml::from_str(&yaml).unwrap();

  let err = Registry::builtin().get_targets("helm", declaration, &ctx).unwrap_err();

  assert!(matches!(err.root(), CompileError::InvalidSource { path, .. } if path == "../common.yaml"));
  assert_eq!(
    err.to_string(),
    "compiling helm target 'api': invalid source '../common.yaml': must not leave the package"
  );
}

#[test]
fn http_chart_synthesizes_repo_flag() {
  let yaml = HELM_API.replace("myrepo/mychart", "https://charts.example.com/repo/mychart");
  let target = compile("helm", &yaml);
  let ScriptAction::HelmUpgrade(release) = &target.script(ScriptKind::Deploy).unwrap().action else {
    panic!("deploy should upgrade the release");
  };

  assert_eq!(
    release.chart,
    ChartSource::Repository {
      repo: "https://charts.example.com/repo".to_string(),
      chart: "mychart".to_string(),
    }
  );
  let argv = args::helm_upgrade(release, &RuntimeContext::new("staging"), Path::new("/work/api")).unwrap();
  assert!(argv.windows(2).any(|w| w == ["--repo=https://charts.example.com/repo", "mychart"]));
}

#[test]
fn toolchain_precedence_across_kinds() {
  let empty = Toolchains::new();
  let ctx = CompileContext::new(&empty);
  let registry = Registry::builtin();

  for (kind, yaml) in [
    ("helm", "name: a\nchart: c\nrelease_name: a\ntoolchain: /opt/helm\n"),
    ("kubernetes", "name: k\ntoolchain: /opt/kubectl\n"),
    ("helm_chart", "name: c\nchart: redis\nversion: 1.0.0\ntoolchain: /opt/helm\n"),
  ] {
    let declaration = serde_yaml::from_str(yaml).unwrap();
    let targets = registry.get_targets(kind, declaration, &ctx).unwrap();
    assert!(targets[0].tools.values().all(|tool| tool.starts_with("/opt/")), "{kind}");
  }

  for (kind, yaml) in [
    ("helm", "name: a\nchart: c\nrelease_name: a\n"),
    ("kubernetes", "name: k\n"),
    ("helm_chart", "name: c\nchart: redis\nversion: 1.0.0\n"),
  ] {
    let declaration = serde_yaml::from_str(yaml).unwrap();
    let err = registry.get_targets(kind, declaration, &ctx).unwrap_err();
    assert!(matches!(err.root(), CompileError::ToolchainNotConfigured { .. }), "{kind}");
  }
}

#[test]
fn compiled_target_serializes_for_inspection() {
  let target = compile("kubernetes", "name: crds\nsrcs: [crds.yaml]\nurls: [https://example.com/crds.yaml]\n");

  let json = serde_json::to_value(&target).unwrap();

  assert_eq!(json["kind"], "kubernetes");
  assert_eq!(json["tools"]["kubectl"], "kubectl");
  assert_eq!(json["scripts"]["deploy"]["action"]["action"], "kubectl_apply");
  assert_eq!(json["labels"][0], "url=https://example.com/crds.yaml");

  let back: kdeploy_lib::target::CompiledTarget = serde_json::from_value(json).unwrap();
  assert_eq!(back, target);
}

#[test]
fn invalid_environment_is_reported_with_target() {
  let toolchains = toolchains();
  let ctx = CompileContext::new(&toolchains);
  let declaration = serde_yaml::from_str("name: crds\nenvironments:\n  chart: {}\n").unwrap();

  let err = Registry::builtin().get_targets("kubernetes", declaration, &ctx).unwrap_err();

  assert!(matches!(err.root(), CompileError::InvalidEnvironment { .. }));
  assert!(err.to_string().starts_with("compiling kubernetes target 'crds'"));
}

#[test]
fn helm_chart_kind() {
  let target = compile("helm_chart", "name: redis\nchart: bitnami/redis\nversion: 18.1.0\n");
  assert_eq!(target.kind, TargetKind::HelmChart);
  assert_eq!(target.outs, vec!["redis/**/*"]);
}
