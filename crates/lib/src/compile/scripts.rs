//! Build plans shared by the Kubernetes and Helm compilers.

use crate::compile::EnvironmentExpander;
use crate::consts;
use crate::placeholder::Variables;
use crate::target::{BuildPlan, CopyMode, CopySet, SourceMap};

/// Derive the build plan for an expanded source map.
///
/// - `_srcs` is copied to `<workdir>/_srcs` with the base variables
/// - `<env>` and `values_<env>` are copied to `<workdir>/<env>` with that
///   environment's variables
/// - `chart` is linked into `<workdir>/chart`
///
/// With `flatten`, `_srcs` and `<env>` files lose their directories and land
/// directly under their destination. Values files always keep their layout.
pub fn build_plan(srcs: &SourceMap, expander: &EnvironmentExpander, base: &Variables, flatten: bool) -> BuildPlan {
  let mut copies = Vec::new();

  if let Some(shared) = srcs.get(consts::SHARED_SRCS) {
    copies.push(CopySet {
      category: consts::SHARED_SRCS.to_string(),
      sources: shared.to_vec(),
      root: String::new(),
      dest: consts::SHARED_SRCS.to_string(),
      flatten,
      mode: CopyMode::Interpolate,
      vars: base.clone(),
    });
  }

  for (env, vars) in expander.variables() {
    for (category, flatten) in [(env.clone(), flatten), (consts::values_category(env), false)] {
      if let Some(sources) = srcs.get(&category) {
        copies.push(CopySet {
          category,
          sources: sources.to_vec(),
          root: String::new(),
          dest: env.clone(),
          flatten,
          mode: CopyMode::Interpolate,
          vars: vars.clone(),
        });
      }
    }
  }

  if let Some(chart) = srcs.get(consts::CHART) {
    copies.push(CopySet {
      category: consts::CHART.to_string(),
      sources: chart.to_vec(),
      root: String::new(),
      dest: consts::CHART.to_string(),
      flatten: false,
      mode: CopyMode::Link,
      vars: Variables::new(),
    });
  }

  BuildPlan { copies }
}
