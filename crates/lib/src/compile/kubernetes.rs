//! Compiler for `kubernetes` declarations.
//!
//! Manifests are expanded per environment and materialized by the build
//! directly under `<workdir>/<env>`, keeping only their file names since
//! `kubectl apply -f <dir>` does not descend into subdirectories. Shared
//! sources land in `<workdir>/_srcs`. Deploy applies both directories plus any
//! remote URLs with `kubectl apply`; remove deletes the same set.

use std::collections::BTreeMap;

use crate::compile::environment::{expand_shared, interpolate, validate_passed};
use crate::compile::scripts::build_plan;
use crate::compile::{CompileContext, CompileError, EnvironmentExpander, TargetDeclaration};
use crate::consts;
use crate::declaration::KubernetesDecl;
use crate::target::{
  CompiledTarget, KubeManifests, LifecycleScript, Metadata, ScriptAction, ScriptKind, TargetKind,
};

impl TargetDeclaration for KubernetesDecl {
  const KIND: TargetKind = TargetKind::Kubernetes;

  fn name(&self) -> &str {
    &self.common.name
  }

  fn compile(&self, ctx: &CompileContext<'_>) -> Result<Vec<CompiledTarget>, CompileError> {
    let common = &self.common;
    let tool = ctx.toolchains.resolve(consts::KUBECTL, &common.toolchain)?;
    validate_passed(common.pass_env.iter().chain(&common.secret_env))?;

    let base = ctx.base_variables(common, consts::NAMESPACE_VAR);
    let expander = EnvironmentExpander::new(&base, &common.environments)?;

    let (mut srcs, mut outs) = expander.expand(&common.srcs)?;
    let shared = !common.shared_srcs.is_empty();
    if shared {
      srcs.insert(consts::SHARED_SRCS, expand_shared(&common.shared_srcs, &base)?);
      outs.push(format!("{}/**", consts::SHARED_SRCS));
    }

    let urls = self
      .urls
      .iter()
      .map(|url| interpolate(url, &base, None))
      .collect::<Result<Vec<_>, _>>()?;

    let metadata = Metadata {
      namespace: common.namespace.value().cloned(),
      urls: urls.clone(),
      apply_files: expander.names(),
      ..Default::default()
    };

    let mut labels = common.labels.clone();
    labels.extend(metadata.labels());

    let manifests = KubeManifests {
      tool: tool.clone(),
      namespace: common.namespace.clone(),
      urls,
      shared,
      environments: expander.variables().clone(),
    };

    let mut scripts = BTreeMap::new();
    scripts.insert(
      ScriptKind::Build,
      LifecycleScript::new(common.deps.clone(), ScriptAction::Build(build_plan(&srcs, &expander, &base, true))),
    );
    scripts.insert(
      ScriptKind::Deploy,
      LifecycleScript::new(common.deploy_deps.clone(), ScriptAction::KubectlApply(manifests.clone())),
    );
    scripts.insert(
      ScriptKind::Remove,
      LifecycleScript::new(Vec::new(), ScriptAction::KubectlDelete(manifests)),
    );

    Ok(vec![CompiledTarget {
      name: common.name.clone(),
      kind: TargetKind::Kubernetes,
      description: common.description.value().cloned(),
      tools: BTreeMap::from([(consts::KUBECTL.to_string(), tool)]),
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
