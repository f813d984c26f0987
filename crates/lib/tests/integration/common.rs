//! Shared helpers for library integration tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use kdeploy_lib::compile::{CompileContext, Registry};
use kdeploy_lib::execute::{ExecuteError, Executor, Invocation};
use kdeploy_lib::target::CompiledTarget;
use kdeploy_lib::toolchain::Toolchains;
use tempfile::TempDir;
use tokio::sync::watch;

pub fn toolchains() -> Toolchains {
  Toolchains::new().with("helm", "helm").with("kubectl", "kubectl")
}

/// Compile a single YAML declaration of `kind`.
pub fn compile(kind: &str, yaml: &str) -> CompiledTarget {
  let toolchains = toolchains();
  let ctx = CompileContext::new(&toolchains);
  let declaration: serde_yaml::Value = serde_yaml::from_str(yaml).unwrap();
  let mut targets = Registry::builtin().get_targets(kind, declaration, &ctx).unwrap();
  assert_eq!(targets.len(), 1);
  targets.remove(0)
}

/// Isolated package source tree and work root.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn src_root(&self) -> PathBuf {
    self.temp.path().join("src")
  }

  pub fn workdir(&self, target: &str) -> PathBuf {
    self.temp.path().join("work").join(target)
  }

  /// Write a file relative to the source root.
  pub fn write_src(&self, relative_path: &str, content: &str) {
    let path = self.src_root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read(&self, path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
  }
}

/// Records invocations without running anything.
#[derive(Debug, Default)]
pub struct Recorder {
  pub calls: Mutex<Vec<Invocation>>,
}

impl Recorder {
  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }
}

impl Executor for Recorder {
  async fn run(&self, invocation: &Invocation, _cancel: watch::Receiver<bool>) -> Result<(), ExecuteError> {
    self.calls.lock().unwrap().push(invocation.clone());
    Ok(())
  }
}
