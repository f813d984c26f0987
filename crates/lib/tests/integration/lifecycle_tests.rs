//! Build, deploy and remove against real files with a recording executor.

use kdeploy_lib::execute::{ReferenceOutputs, ScriptEnv, ScriptRunner, ScriptState};
use kdeploy_lib::target::{RuntimeContext, ScriptKind};

use super::common::{Recorder, Workspace, compile};

const LOCAL_CHART: &str = "name: api-chart\npath: charts/api\n";

const HELM_WITH_REFERENCE: &str = r#"
name: api
chart: ":api-chart"
release_name: api
namespace: backend
values_files: ["values/{ENV}.yaml"]
environments:
  prod:
    vars: { REPLICAS: "3" }
"#;

/// Build the local chart and return its outputs as the host would report them.
async fn build_chart(ws: &Workspace) -> ReferenceOutputs {
  ws.write_src("charts/api/Chart.yaml", "name: api\nversion: 1.2.0\n");
  ws.write_src("charts/api/templates/deployment.yaml", "replicas: {{ .Values.replicas }}\n");

  let chart = compile("helm_chart", LOCAL_CHART);
  let runner = ScriptRunner::new(Recorder::default(), RuntimeContext::default());
  let mut env = ScriptEnv::new(ws.workdir("api-chart"), ws.src_root());
  runner
    .run_script(&chart, ScriptKind::Build, &mut env, |_| {})
    .await
    .unwrap();

  ReferenceOutputs {
    root: ws.workdir("api-chart"),
    paths: vec!["api/Chart.yaml".to_string(), "api/templates/deployment.yaml".to_string()],
  }
}

#[tokio::test]
async fn local_chart_lands_in_its_folder() {
  let ws = Workspace::new();
  build_chart(&ws).await;

  let deployment = ws.workdir("api-chart").join("api/templates/deployment.yaml");
  assert_eq!(ws.read(&deployment), "replicas: {{ .Values.replicas }}\n");
}

#[tokio::test]
async fn referenced_chart_is_stripped_and_idempotent() {
  let ws = Workspace::new();
  let outputs = build_chart(&ws).await;
  ws.write_src("values/prod.yaml", "replicas: {REPLICAS}\n");

  let api = compile("helm", HELM_WITH_REFERENCE);
  assert!(api.build_deps().contains(&":api-chart".to_string()));

  let runner = ScriptRunner::new(Recorder::default(), RuntimeContext::new("prod"));
  let mut env = ScriptEnv::new(ws.workdir("api"), ws.src_root()).with_reference(":api-chart", outputs);

  for _ in 0..2 {
    runner
      .run_script(&api, ScriptKind::Build, &mut env, |_| {})
      .await
      .unwrap();
  }

  let workdir = ws.workdir("api");
  assert_eq!(
    ws.read(&workdir.join("chart/templates/deployment.yaml")),
    "replicas: {{ .Values.replicas }}\n"
  );
  assert!(workdir.join("chart/Chart.yaml").is_file());
  assert!(!workdir.join("chart/api").exists());
  assert_eq!(ws.read(&workdir.join("prod/values/prod.yaml")), "replicas: 3\n");
}

#[tokio::test]
async fn deploy_and_remove_use_built_chart() {
  let ws = Workspace::new();
  let outputs = build_chart(&ws).await;
  ws.write_src("values/prod.yaml", "replicas: {REPLICAS}\n");

  let api = compile("helm", HELM_WITH_REFERENCE);
  let runner = ScriptRunner::new(Recorder::default(), RuntimeContext::new("prod").with_debug(true));
  let mut env = ScriptEnv::new(ws.workdir("api"), ws.src_root()).with_reference(":api-chart", outputs);
  let mut states = Vec::new();

  for kind in [ScriptKind::Build, ScriptKind::Deploy, ScriptKind::Remove] {
    runner
      .run_script(&api, kind, &mut env, |state| states.push((kind, state)))
      .await
      .unwrap();
  }

  let calls = runner.executor().calls();
  assert_eq!(calls.len(), 2);

  let chart_dir = ws.workdir("api").join("chart").to_string_lossy().into_owned();
  assert_eq!(
    calls[0].argv,
    vec![
      "helm",
      "upgrade",
      "-i",
      "--wait",
      "--debug",
      "-f",
      "values/prod.yaml",
      "-n",
      "backend",
      "api",
      chart_dir.as_str(),
    ]
  );
  assert_eq!(calls[1].argv, vec!["helm", "uninstall", "--wait", "api"]);
  assert_eq!(calls[1].env["HELM_NAMESPACE"], "backend");
  assert_eq!(calls[1].env["KDEPLOY_DEBUG_CMD"], "helm uninstall --wait api");
  assert!(
    states
      .iter()
      .filter(|(_, state)| *state == ScriptState::Succeeded)
      .count()
      == 3
  );
}

#[tokio::test]
async fn kubernetes_build_then_apply() {
  let ws = Workspace::new();
  ws.write_src("ingress.yaml", "metadata:\n  namespace: {NAMESPACE}\n  labels: {env: {ENV}}\n");

  let target = compile(
    "kubernetes",
    "name: ingress\nnamespace: edge\nsrcs: [ingress.yaml]\nenvironments:\n  prod: {}\n  staging: {}\n",
  );
  let runner = ScriptRunner::new(Recorder::default(), RuntimeContext::new("staging").with_dry_run(true));
  let mut env = ScriptEnv::new(ws.workdir("ingress"), ws.src_root());

  runner
    .run_script(&target, ScriptKind::Build, &mut env, |_| {})
    .await
    .unwrap();
  runner
    .run_script(&target, ScriptKind::Deploy, &mut env, |_| {})
    .await
    .unwrap();

  let workdir = ws.workdir("ingress");
  assert_eq!(
    ws.read(&workdir.join("staging/ingress.yaml")),
    "metadata:\n  namespace: edge\n  labels: {env: staging}\n"
  );
  assert!(workdir.join("prod/ingress.yaml").is_file());

  let calls = runner.executor().calls();
  let manifests = workdir.join("staging").to_string_lossy().into_owned();
  assert_eq!(
    calls[0].argv,
    vec![
      "kubectl",
      "apply",
      "--wait",
      "-f",
      manifests.as_str(),
      "-n",
      "edge",
      "--dry-run=server",
    ]
  );
  assert_eq!(calls[0].cwd, workdir.join("staging"));
  assert_eq!(calls[0].env["NAMESPACE"], "edge");
}

#[tokio::test]
async fn nested_and_shared_manifests_reach_kubectl() {
  let ws = Workspace::new();
  ws.write_src("manifests/prod/deploy.yaml", "kind: Deployment\nenv: {ENV}\n");
  ws.write_src("manifests/common/service.yaml", "kind: Service\n");
  ws.write_src("crds/widget.yaml", "kind: CustomResourceDefinition\nnamespace: {NAMESPACE}\n");

  let target = compile(
    "kubernetes",
    r#"
name: widgets
namespace: edge
srcs: ["manifests/{ENV}/deploy.yaml", "manifests/common/*.yaml"]
shared_srcs: ["crds/*.yaml"]
environments:
  prod: {}
"#,
  );
  let runner = ScriptRunner::new(Recorder::default(), RuntimeContext::new("prod"));
  let mut env = ScriptEnv::new(ws.workdir("widgets"), ws.src_root());

  for kind in [ScriptKind::Build, ScriptKind::Deploy, ScriptKind::Remove] {
    runner.run_script(&target, kind, &mut env, |_| {}).await.unwrap();
  }

  let workdir = ws.workdir("widgets");
  assert_eq!(ws.read(&workdir.join("prod/deploy.yaml")), "kind: Deployment\nenv: prod\n");
  assert!(workdir.join("prod/service.yaml").is_file());
  assert!(!workdir.join("prod/manifests").exists());
  assert_eq!(
    ws.read(&workdir.join("_srcs/widget.yaml")),
    "kind: CustomResourceDefinition\nnamespace: edge\n"
  );

  let prod = workdir.join("prod").to_string_lossy().into_owned();
  let shared = workdir.join("_srcs").to_string_lossy().into_owned();
  let calls = runner.executor().calls();
  assert_eq!(
    calls[0].argv,
    vec!["kubectl", "apply", "--wait", "-f", prod.as_str(), "-f", shared.as_str(), "-n", "edge"]
  );
  assert_eq!(
    calls[1].argv,
    vec!["kubectl", "delete", "--wait", "-n", "edge", "-f", prod.as_str(), "-f", shared.as_str()]
  );
}
