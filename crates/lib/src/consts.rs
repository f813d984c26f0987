//! Names shared between the compiler, the lifecycle scripts and the host.

/// Source category for environment-independent sources.
pub const SHARED_SRCS: &str = "_srcs";

/// Source category for chart files produced by another target.
pub const CHART: &str = "chart";

/// Reserved source category name.
pub const VALUES: &str = "values";

/// Prefix of the per-environment values-file categories (`values_<env>`).
pub const VALUES_PREFIX: &str = "values_";

/// Environment used when a declaration names none.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Variable holding the fully assembled command line of a deploy/remove step.
pub const DEBUG_CMD_VAR: &str = "KDEPLOY_DEBUG_CMD";

/// Namespace variable read by `helm`.
pub const HELM_NAMESPACE_VAR: &str = "HELM_NAMESPACE";

/// Namespace variable set for `kubectl` invocations and manifest interpolation.
pub const NAMESPACE_VAR: &str = "NAMESPACE";

pub const HELM: &str = "helm";
pub const KUBECTL: &str = "kubectl";

/// Returns the values category of `env`.
pub fn values_category(env: &str) -> String {
  format!("{VALUES_PREFIX}{env}")
}

/// Returns true if `name` cannot be used as an environment name.
pub fn is_reserved_category(name: &str) -> bool {
  name == SHARED_SRCS || name == CHART || name == VALUES || name.starts_with(VALUES_PREFIX)
}
