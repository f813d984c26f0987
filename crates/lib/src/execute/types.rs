//! Types for lifecycle script execution.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::placeholder::PlaceholderError;
use crate::target::ScriptKind;

/// Errors that can occur while running a lifecycle script.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The tool exited unsuccessfully. `code` is `None` when killed by a signal.
  #[error("{tool} failed during {phase} with exit code {}", display_code(.code))]
  CmdFailed {
    tool: String,
    phase: ScriptKind,
    code: Option<i32>,
  },

  /// The run was cancelled and the child process killed.
  #[error("{tool} cancelled during {phase}")]
  Cancelled { tool: String, phase: ScriptKind },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("copying {} to {}: {error}", from.display(), to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    error: std::io::Error,
  },

  #[error("placeholder error: {0}")]
  Placeholder(#[from] PlaceholderError),

  /// The runtime environment is not one the target was compiled for.
  #[error("unknown environment '{env}' (available: {})", available.join(", "))]
  UnknownEnvironment { env: String, available: Vec<String> },

  /// The target has no script of this kind.
  #[error("no {0} script")]
  MissingScript(ScriptKind),

  /// The host supplied no outputs for a referenced target.
  #[error("unresolved reference: {0}")]
  UnresolvedReference(String),

  /// Two sources of a flattened copy set share a file name.
  #[error("{} and {} both flatten to {}", first.display(), second.display(), dest.display())]
  FlattenCollision {
    dest: PathBuf,
    first: PathBuf,
    second: PathBuf,
  },

  #[error("invalid glob '{pattern}': {error}")]
  Glob {
    pattern: String,
    #[source]
    error: glob::PatternError,
  },
}

fn display_code(code: &Option<i32>) -> String {
  match code {
    Some(code) => code.to_string(),
    None => "none (terminated by signal)".to_string(),
  }
}

/// An [`ExecuteError`] with the target and script it happened in.
#[derive(Debug, Error)]
#[error("{script} of '{target}' failed: {source}")]
pub struct ScriptError {
  pub target: String,
  pub script: ScriptKind,
  #[source]
  pub source: ExecuteError,
}

/// Progress of a single script run.
///
/// `Pending -> Pre -> Running -> {Succeeded | Failed}`. A failing pre step
/// moves straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
  Pending,
  Pre,
  Running,
  Succeeded,
  Failed,
}

impl ScriptState {
  pub fn is_terminal(self) -> bool {
    matches!(self, ScriptState::Succeeded | ScriptState::Failed)
  }
}

impl fmt::Display for ScriptState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ScriptState::Pending => "pending",
      ScriptState::Pre => "pre",
      ScriptState::Running => "running",
      ScriptState::Succeeded => "succeeded",
      ScriptState::Failed => "failed",
    };
    f.write_str(name)
  }
}
