//! kdeploy-lib: Target compiler for Kubernetes and Helm deployments
//!
//! This crate turns pre-parsed deployment declarations into compiled targets
//! that a build-graph engine schedules:
//! - `declaration`: the user-authored `kubernetes`, `helm` and `helm_chart` units
//! - `compile`: toolchain resolution, environment expansion and script synthesis
//! - `target`: compiled targets, their lifecycle scripts and typed metadata
//! - `args`: exact command lines for `helm` and `kubectl`
//! - `execute`: running a compiled script against a host-owned environment
//! - `config`: the host's `kdeploy.toml` with toolchains and variables

pub mod args;
pub mod compile;
pub mod config;
pub mod consts;
pub mod declaration;
pub mod execute;
pub mod placeholder;
pub mod reference;
pub mod target;
pub mod toolchain;

#[cfg(test)]
pub mod testutil;
