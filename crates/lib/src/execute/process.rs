//! Subprocess execution.
//!
//! `helm` and `kubectl` run as opaque child processes. Their output is not
//! captured; each line is forwarded to `tracing` with the target name and the
//! stream it came from.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{Instrument, debug, info, warn};

use crate::execute::types::ExecuteError;
use crate::target::ScriptKind;

/// One tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub argv: Vec<String>,
  pub cwd: PathBuf,
  /// Added to the inherited process environment.
  pub env: BTreeMap<String, String>,
  /// Target name, for log attribution.
  pub target: String,
  pub phase: ScriptKind,
}

impl Invocation {
  pub fn tool(&self) -> &str {
    self.argv.first().map(String::as_str).unwrap_or_default()
  }
}

/// Runs tool invocations.
///
/// Implementations must report a non-zero exit as [`ExecuteError::CmdFailed`]
/// and a cancellation as [`ExecuteError::Cancelled`].
pub trait Executor: Send + Sync {
  fn run(
    &self,
    invocation: &Invocation,
    cancel: watch::Receiver<bool>,
  ) -> impl Future<Output = Result<(), ExecuteError>> + Send;
}

/// Resolves once `cancel` turns true. Never resolves if the sender is gone.
async fn cancelled(mut cancel: watch::Receiver<bool>) {
  if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
    std::future::pending::<()>().await;
  }
}

fn forward_lines<R>(reader: R, target: String, stream: &'static str) -> tokio::task::JoinHandle<()>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(
    async move {
      let mut lines = BufReader::new(reader).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        match stream {
          "stderr" => warn!(target_name = %target, stream, "{line}"),
          _ => info!(target_name = %target, stream, "{line}"),
        }
      }
    }
    .in_current_span(),
  )
}

/// Wait for every forwarder. A forwarder that panicked loses its remaining
/// lines but does not fail the invocation.
async fn join_forwarders(forwarders: Vec<tokio::task::JoinHandle<()>>, target: &str) {
  for forwarder in forwarders {
    if let Err(e) = forwarder.await {
      warn!(target_name = %target, error = %e, "output forwarder failed");
    }
  }
}

/// The error reported for a cancelled invocation, whatever became of the kill.
fn cancellation(invocation: &Invocation, tool: &str, killed: std::io::Result<()>) -> ExecuteError {
  if let Err(e) = killed {
    warn!(target_name = %invocation.target, phase = %invocation.phase, error = %e, "failed to kill child process");
  }
  ExecuteError::Cancelled {
    tool: tool.to_string(),
    phase: invocation.phase,
  }
}

/// Runs invocations as child processes with tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
  async fn run(&self, invocation: &Invocation, cancel: watch::Receiver<bool>) -> Result<(), ExecuteError> {
    let Some((program, args)) = invocation.argv.split_first() else {
      return Err(ExecuteError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "empty command line",
      )));
    };

    info!(target_name = %invocation.target, phase = %invocation.phase, cmd = %invocation.argv.join(" "), "executing");
    debug!(cwd = ?invocation.cwd, "spawning process");

    let mut child = Command::new(program)
      .args(args)
      .current_dir(&invocation.cwd)
      .envs(&invocation.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

    let mut forwarders = Vec::new();
    if let Some(stdout) = child.stdout.take() {
      forwarders.push(forward_lines(stdout, invocation.target.clone(), "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
      forwarders.push(forward_lines(stderr, invocation.target.clone(), "stderr"));
    }

    let status = tokio::select! {
      status = child.wait() => status?,
      _ = cancelled(cancel) => {
        warn!(target_name = %invocation.target, phase = %invocation.phase, "cancelling");
        let killed = child.kill().await;
        return Err(cancellation(invocation, program, killed));
      }
    };

    join_forwarders(forwarders, &invocation.target).await;

    if !status.success() {
      return Err(ExecuteError::CmdFailed {
        tool: program.clone(),
        phase: invocation.phase,
        code: status.code(),
      });
    }

    debug!(target_name = %invocation.target, phase = %invocation.phase, "command succeeded");
    Ok(())
  }
}
