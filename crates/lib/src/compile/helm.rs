//! Compiler for `helm` declarations.
//!
//! Values files are copied into every environment directory with their layout
//! intact, and `helm` reads them relative to that directory. The target's
//! `values_<env>` categories record the materialized `<env>/<file>` paths, so
//! no two environments share a path string.

use std::collections::BTreeMap;

use tracing::debug;

use crate::compile::environment::{expand_shared, validate_passed};
use crate::compile::scripts::build_plan;
use crate::compile::{CompileContext, CompileError, EnvironmentExpander, TargetDeclaration};
use crate::consts;
use crate::declaration::HelmDecl;
use crate::reference::{ReferenceSyntax, is_http_url, split_chart_url};
use crate::target::{
  ChartSource, CompiledTarget, HelmRelease, LifecycleScript, Metadata, ScriptAction, ScriptKind, SourceMap,
  TargetKind,
};

/// Decide where `helm` finds the chart.
fn classify_chart(chart: &str, references: &dyn ReferenceSyntax) -> ChartSource {
  if references.is_reference(chart) {
    return ChartSource::Reference {
      target: chart.to_string(),
    };
  }
  if is_http_url(chart) {
    if let Some((repo, name)) = split_chart_url(chart) {
      return ChartSource::Repository {
        repo: repo.to_string(),
        chart: name.to_string(),
      };
    }
  }
  ChartSource::Named {
    chart: chart.to_string(),
  }
}

/// Values categories as materialized: each file under its environment.
fn materialized_values(values_by_env: &BTreeMap<String, Vec<String>>) -> SourceMap {
  let mut srcs = SourceMap::new();
  for (env, files) in values_by_env {
    let paths = files
      .iter()
      .map(|file| format!("{env}/{}", file.trim_start_matches("./")))
      .collect();
    srcs.insert(consts::values_category(env), paths);
  }
  srcs
}

impl TargetDeclaration for HelmDecl {
  const KIND: TargetKind = TargetKind::Helm;

  fn name(&self) -> &str {
    &self.common.name
  }

  fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError> {
    let common = &self.common;
    if self.release_name.is_empty() {
      return Err(CompileError::MissingField("release_name"));
    }
    if self.chart.is_empty() {
      return Err(CompileError::MissingField("chart"));
    }

    let tool = ctx.toolchains.resolve(consts::HELM, &common.toolchain)?;
    validate_passed(common.pass_env.iter().chain(&common.secret_env))?;

    let base = ctx.base_variables(common, consts::HELM_NAMESPACE_VAR);
    let expander = EnvironmentExpander::new(&base, &common.environments)?;

    let (mut srcs, mut outs) = expander.expand(&common.srcs)?;
    let values = expander.expand_values(&self.values_files)?;
    let values_by_env: BTreeMap<String, Vec<String>> = expander
      .names()
      .into_iter()
      .map(|env| {
        let files = values.get(&consts::values_category(&env)).unwrap_or_default().to_vec();
        (env, files)
      })
      .collect();
    srcs.extend(values);

    if !common.shared_srcs.is_empty() {
      srcs.insert(consts::SHARED_SRCS, expand_shared(&common.shared_srcs, &base)?);
      outs.push(format!("{}/**", consts::SHARED_SRCS));
    }

    let mut build_deps = common.deps.clone();
    let chart = classify_chart(&self.chart, ctx.references);
    debug!(target = %common.name, chart = ?chart, "classified chart");
    if let ChartSource::Reference { target } = &chart {
      build_deps.push(target.clone());
      srcs.push(consts::CHART, target.clone());
      outs.push(format!("{}/**/*", consts::CHART));
    }

    let metadata = Metadata {
      release: Some(self.release_name.clone()),
      namespace: common.namespace.value().cloned(),
      chart: Some(self.chart.clone()),
      version: self.version.value().cloned(),
      args: self.args.clone(),
      ..Default::default()
    };

    let mut labels = common.labels.clone();
    labels.extend(metadata.labels());

    let release = HelmRelease {
      tool: tool.clone(),
      release: self.release_name.clone(),
      namespace: common.namespace.clone(),
      chart,
      version: self.version.clone(),
      values: values_by_env,
      args: self.args.clone(),
      environments: expander.variables().clone(),
    };

    let plan = build_plan(&srcs, &expander, &base, false);
    for (category, paths) in materialized_values(&release.values).iter() {
      srcs.insert(category.clone(), paths.clone());
    }

    let mut scripts = BTreeMap::new();
    scripts.insert(ScriptKind::Build, LifecycleScript::new(build_deps, ScriptAction::Build(plan)));
    scripts.insert(
      ScriptKind::Deploy,
      LifecycleScript::new(common.deploy_deps.clone(), ScriptAction::HelmUpgrade(release.clone())),
    );
    scripts.insert(
      ScriptKind::Remove,
      LifecycleScript::new(Vec::new(), ScriptAction::HelmUninstall(release)),
    );

    Ok(vec![CompiledTarget {
      name: common.name.clone(),
      kind: TargetKind::Helm,
      description: common.description.value().cloned(),
      tools: BTreeMap::from([(consts::HELM.to_string(), tool)]),
      srcs,
      outs,
      labels,
      metadata,
      env: base,
      environments: expander.names(),
      pass_env: common.pass_env.clone(),
      secret_env: common.secret_env.clone(),
      scripts,
    }])
  }
}
