//! Materialization of build copy sets.
//!
//! Sources are globs relative to the package source root. Each match keeps its
//! layout relative to the copy set's root and lands under the destination in
//! the working directory, unless the set is flattened: then every file goes
//! directly under the destination and two files with the same name are an
//! error. Reference outputs are linked instead, with their first path segment
//! removed. Existing destinations are replaced, so running a build twice
//! yields the same tree.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use crate::execute::ScriptEnv;
use crate::execute::types::ExecuteError;
use crate::placeholder::{self, Variables};
use crate::reference::strip_first_segment;
use crate::target::{CopyMode, CopySet};

fn copy_error(from: &Path, to: &Path) -> impl FnOnce(std::io::Error) -> ExecuteError {
  let from = from.to_path_buf();
  let to = to.to_path_buf();
  move |error| ExecuteError::Copy { from, to, error }
}

fn is_glob(pattern: &str) -> bool {
  pattern.contains(['*', '?', '['])
}

/// Expand one source pattern against `src_root`.
///
/// A pattern without glob characters must name an existing file.
fn expand_source(src_root: &Path, pattern: &str) -> Result<Vec<PathBuf>, ExecuteError> {
  if !is_glob(pattern) {
    return Ok(vec![src_root.join(pattern)]);
  }

  let full = format!(
    "{}/{}",
    glob::Pattern::escape(&src_root.to_string_lossy()),
    pattern.trim_start_matches('/')
  );
  let paths = glob::glob(&full).map_err(|error| ExecuteError::Glob {
    pattern: pattern.to_string(),
    error,
  })?;

  let mut files = Vec::new();
  for entry in paths {
    let path = entry.map_err(std::io::Error::from)?;
    if path.is_file() {
      files.push(path);
    }
  }
  Ok(files)
}

fn file_name(source: &Path) -> PathBuf {
  source.file_name().map(PathBuf::from).unwrap_or_default()
}

/// Where `source` goes: its path relative to `root`, or its file name when it
/// lies outside `root`. The result never leaves the destination.
fn relative_dest(source: &Path, root: &Path) -> PathBuf {
  match source.strip_prefix(root) {
    Ok(relative) if relative.components().all(|c| matches!(c, Component::Normal(_))) => relative.to_path_buf(),
    _ => file_name(source),
  }
}

async fn write_file(from: &Path, to: &Path, vars: Option<&Variables>) -> Result<(), ExecuteError> {
  if let Some(parent) = to.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  let bytes = tokio::fs::read(from).await.map_err(copy_error(from, to))?;
  let contents = match (vars, String::from_utf8(bytes)) {
    (Some(vars), Ok(text)) => placeholder::substitute(&text, vars)?.into_bytes(),
    (_, Ok(text)) => text.into_bytes(),
    (_, Err(binary)) => binary.into_bytes(),
  };

  tokio::fs::write(to, contents).await.map_err(copy_error(from, to))?;
  trace!(from = ?from, to = ?to, "copied");
  Ok(())
}

/// Hard-link `from` to `to`, replacing `to`. Falls back to a copy across
/// filesystems.
async fn link_file(from: &Path, to: &Path) -> Result<(), ExecuteError> {
  if let Some(parent) = to.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }

  match tokio::fs::remove_file(to).await {
    Ok(()) => {}
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => return Err(copy_error(from, to)(e)),
  }

  if tokio::fs::hard_link(from, to).await.is_err() {
    tokio::fs::copy(from, to).await.map_err(copy_error(from, to))?;
  }
  trace!(from = ?from, to = ?to, "linked");
  Ok(())
}

/// Materialize one copy set into `env.workdir`. Returns the number of files.
///
/// # Errors
///
/// The first failing file aborts the set; files already written stay.
pub async fn materialize(set: &CopySet, env: &ScriptEnv) -> Result<usize, ExecuteError> {
  let dest_root = env.workdir.join(&set.dest);
  let mut count = 0;

  match set.mode {
    CopyMode::Interpolate | CopyMode::Raw => {
      let vars = (set.mode == CopyMode::Interpolate).then_some(&set.vars);
      let root = env.src_root.join(&set.root);
      let mut flattened = BTreeMap::new();
      for pattern in &set.sources {
        for source in expand_source(&env.src_root, pattern)? {
          let to = if set.flatten {
            let to = dest_root.join(file_name(&source));
            if let Some(first) = flattened.insert(to.clone(), source.clone()) {
              if first != source {
                return Err(ExecuteError::FlattenCollision {
                  dest: to,
                  first,
                  second: source,
                });
              }
            }
            to
          } else {
            dest_root.join(relative_dest(&source, &root))
          };
          write_file(&source, &to, vars).await?;
          count += 1;
        }
      }
    }
    CopyMode::Link => {
      for reference in &set.sources {
        let outputs = env
          .references
          .get(reference)
          .ok_or_else(|| ExecuteError::UnresolvedReference(reference.clone()))?;
        for path in &outputs.paths {
          let Some(stripped) = strip_first_segment(path) else {
            continue;
          };
          link_file(&outputs.root.join(path), &dest_root.join(stripped)).await?;
          count += 1;
        }
      }
    }
  }

  debug!(category = %set.category, dest = ?dest_root, count, "materialized");
  Ok(count)
}
