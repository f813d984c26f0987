//! Implementation of the `kdeploy compile` command.
//!
//! Compiles every declaration in the build file and prints the resulting
//! targets, either as a summary or as JSON for other tools to consume.

use std::path::Path;

use anyhow::Result;
use kdeploy_lib::config::Config;

use crate::host::Package;
use crate::output::{OutputFormat, print_info, print_json, print_stat, print_success, print_warning};

pub fn cmd_compile(file: &Path, config: &Config, output: OutputFormat) -> Result<()> {
  let package = Package::load(file, config)?;

  if output.is_json() {
    return print_json(&package.targets);
  }

  if package.targets.is_empty() {
    print_warning(&format!("No declarations in {}", file.display()));
    return Ok(());
  }

  for target in &package.targets {
    print_info(&format!("{} ({})", target.name, target.kind));
    print_stat("environments", &target.environments.join(", "));
    print_stat("outs", &target.outs.join(", "));
    if !target.build_deps().is_empty() {
      print_stat("deps", &target.build_deps().join(", "));
    }
    let scripts: Vec<_> = target.scripts.keys().map(|kind| kind.as_str()).collect();
    print_stat("scripts", &scripts.join(", "));
    for label in &target.labels {
      print_stat("label", label);
    }
  }

  print_success(&format!("Compiled {} target(s)", package.targets.len()));
  Ok(())
}
