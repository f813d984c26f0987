//! Shared fixtures for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::sync::watch;

use crate::compile::{CompileContext, TargetDeclaration};
use crate::declaration::{Common, Environment, HelmDecl, KubernetesDecl, Setting};
use crate::execute::{ExecuteError, Executor, Invocation};
use crate::target::CompiledTarget;
use crate::toolchain::Toolchains;

pub fn toolchains() -> Toolchains {
  Toolchains::new().with("helm", "helm").with("kubectl", "kubectl")
}

pub fn environments(names: &[&str]) -> BTreeMap<String, Environment> {
  names
    .iter()
    .map(|name| (name.to_string(), Environment::default()))
    .collect()
}

/// A compiled `helm` target with `prod` and `staging`.
pub fn helm_target(chart: &str) -> CompiledTarget {
  let decl = HelmDecl {
    common: Common {
      name: "api".to_string(),
      namespace: Setting::Value("backend".to_string()),
      srcs: vec!["manifests/{ENV}.yaml".to_string()],
      environments: environments(&["prod", "staging"]),
      ..Default::default()
    },
    values_files: vec!["values/base.yaml".to_string(), "values/{ENV}.yaml".to_string()],
    chart: chart.to_string(),
    release_name: "api".to_string(),
    version: Setting::Value("1.2.0".to_string()),
    args: BTreeMap::new(),
  };
  compile(&decl)
}

/// A compiled `kubernetes` target with `prod` and `staging`.
pub fn kubernetes_target() -> CompiledTarget {
  let decl = KubernetesDecl {
    common: Common {
      name: "ingress".to_string(),
      namespace: Setting::Value("edge".to_string()),
      srcs: vec!["ingress.yaml".to_string()],
      environments: environments(&["prod", "staging"]),
      ..Default::default()
    },
    urls: vec![],
  };
  compile(&decl)
}

fn compile<T: TargetDeclaration>(decl: &T) -> CompiledTarget {
  let toolchains = toolchains();
  decl
    .get_targets(&CompileContext::new(&toolchains))
    .unwrap()
    .remove(0)
}

/// Records invocations and exits with a fixed code.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
  pub calls: Mutex<Vec<Invocation>>,
  pub exit_code: Option<i32>,
}

impl RecordingExecutor {
  pub fn failing(code: i32) -> Self {
    Self {
      calls: Mutex::new(Vec::new()),
      exit_code: Some(code),
    }
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }
}

impl Executor for RecordingExecutor {
  async fn run(&self, invocation: &Invocation, _cancel: watch::Receiver<bool>) -> Result<(), ExecuteError> {
    self.calls.lock().unwrap().push(invocation.clone());
    match self.exit_code {
      Some(code) => Err(ExecuteError::CmdFailed {
        tool: invocation.tool().to_string(),
        phase: invocation.phase,
        code: Some(code),
      }),
      None => Ok(()),
    }
  }
}
