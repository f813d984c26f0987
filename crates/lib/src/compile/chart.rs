//! Compiler for `helm_chart` declarations.
//!
//! A chart is either a local directory, copied verbatim, or pulled from a
//! repository with `helm pull`. Either way the chart lands in a single folder
//! of the working directory named after the chart, which is the first segment
//! consumers strip when linking it.

use std::collections::BTreeMap;
use std::path::Path;

use crate::compile::{CompileContext, CompileError, TargetDeclaration};
use crate::consts;
use crate::declaration::HelmChartDecl;
use crate::target::{
  BuildPlan, CompiledTarget, CopyMode, CopySet, LifecycleScript, Metadata, PullPlan, ScriptAction, ScriptKind,
  SourceMap, TargetKind,
};

fn basename(path: &str) -> String {
  Path::new(path.trim_end_matches('/'))
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string())
}

fn parent(path: &str) -> String {
  match path.trim_end_matches('/').rsplit_once('/') {
    Some((parent, _)) => parent.to_string(),
    None => String::new(),
  }
}

impl TargetDeclaration for HelmChartDecl {
  const KIND: TargetKind = TargetKind::HelmChart;

  fn name(&self) -> &str {
    &self.name
  }

  fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError> {
    let mut srcs = SourceMap::new();
    let mut tools = BTreeMap::new();

    let (folder, action) = match self.path.non_empty() {
      Some(path) => {
        let sources = vec![format!("{}/**/*", path.trim_end_matches('/'))];
        srcs.insert(consts::SHARED_SRCS, sources.clone());
        let copy = CopySet {
          category: consts::SHARED_SRCS.to_string(),
          sources,
          root: parent(path),
          dest: String::new(),
          flatten: false,
          mode: CopyMode::Raw,
          vars: Default::default(),
        };
        (basename(path), ScriptAction::Build(BuildPlan { copies: vec![copy] }))
      }
      None => {
        if self.chart.is_empty() {
          return Err(CompileError::MissingField("chart"));
        }
        let version = self.version.non_empty().ok_or(CompileError::MissingField("version"))?;
        let tool = ctx.toolchains.resolve(consts::HELM, &self.toolchain)?;
        tools.insert(consts::HELM.to_string(), tool.clone());
        let pull = PullPlan {
          tool,
          chart: self.chart.clone(),
          repo: self.repo.clone(),
          version: version.to_string(),
        };
        (basename(&self.chart), ScriptAction::PullChart(pull))
      }
    };

    let metadata = Metadata {
      chart: (!self.chart.is_empty()).then(|| self.chart.clone()),
      version: self.version.value().cloned(),
      ..Default::default()
    };
    let mut labels = self.labels.clone();
    labels.extend(metadata.labels());

    let scripts = BTreeMap::from([(ScriptKind::Build, LifecycleScript::new(self.deps.clone(), action))]);

    Ok(vec![CompiledTarget {
      name: self.name.clone(),
      kind: TargetKind::HelmChart,
      description: self.description.value().cloned(),
      tools,
      srcs,
      outs: vec![format!("{folder}/**/*")],
      labels,
      metadata,
      env: ctx.vars.clone(),
      environments: Vec::new(),
      pass_env: Vec::new(),
      secret_env: Vec::new(),
      scripts,
    }])
  }
}
