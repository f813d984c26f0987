//! Classification of build-graph references.
//!
//! A chart or source value is either a literal (a path, a URL, a `repo/chart`
//! name) or a reference to another target's output. The exact syntax belongs
//! to the host engine, so it is consumed through [`ReferenceSyntax`].

/// Host-supplied predicate deciding whether a value is a target reference.
pub trait ReferenceSyntax: Send + Sync {
  fn is_reference(&self, value: &str) -> bool;
}

/// The default reference forms: `//path/to/pkg:name` and `:name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetReference;

impl ReferenceSyntax for TargetReference {
  fn is_reference(&self, value: &str) -> bool {
    if let Some(rest) = value.strip_prefix("//") {
      return !rest.is_empty();
    }
    match value.strip_prefix(':') {
      Some(name) => !name.is_empty() && !name.contains('/'),
      None => false,
    }
  }
}

impl<F> ReferenceSyntax for F
where
  F: Fn(&str) -> bool + Send + Sync,
{
  fn is_reference(&self, value: &str) -> bool {
    self(value)
  }
}

/// Remove the first segment of a reference output path.
///
/// Outputs of another target are reported relative to its output directory,
/// with the folder it wrote them under as first segment:
/// `api-chart/templates/deployment.yaml` becomes `templates/deployment.yaml`.
/// Returns `None` when nothing remains after the first segment.
pub fn strip_first_segment(path: &str) -> Option<&str> {
  let trimmed = path.trim_start_matches('/');
  let (_, rest) = trimmed.split_once('/')?;
  let rest = rest.trim_start_matches('/');
  if rest.is_empty() { None } else { Some(rest) }
}

/// Returns true if `value` is an `http://` or `https://` URL.
pub fn is_http_url(value: &str) -> bool {
  value.starts_with("http://") || value.starts_with("https://")
}

/// Split a chart URL into its repository and chart name.
///
/// `https://charts.example.com/repo/mychart` yields
/// (`https://charts.example.com/repo`, `mychart`).
pub fn split_chart_url(url: &str) -> Option<(&str, &str)> {
  let url = url.trim_end_matches('/');
  let (repo, chart) = url.rsplit_once('/')?;
  if chart.is_empty() || repo.ends_with('/') || repo.ends_with(':') {
    return None;
  }
  Some((repo, chart))
}
