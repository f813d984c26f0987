mod cmd;
mod host;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kdeploy_lib::config::Config;
use kdeploy_lib::target::ScriptKind;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use cmd::{RunArgs, cmd_compile, cmd_run};
use output::{OutputFormat, print_error};

/// kdeploy - compile and run Kubernetes and Helm deployment targets
#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the configuration file (default: ./kdeploy.toml when present)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Path to the build file
  #[arg(short, long, global = true, default_value = host::BUILD_FILE)]
  file: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile every declaration and print the targets
  Compile {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Materialize a target's sources into its working directory
  Build(RunArgs),

  /// Install or upgrade a target in its environment
  Deploy(RunArgs),

  /// Uninstall a target from its environment
  Remove(RunArgs),
}

fn main() {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::builder()
      .with_default_directive(LevelFilter::INFO.into())
      .from_env_lossy()
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

  match cli.command {
    Commands::Compile { output } => cmd_compile(&cli.file, &config, output),
    Commands::Build(args) => cmd_run(ScriptKind::Build, &cli.file, &config, &args),
    Commands::Deploy(args) => cmd_run(ScriptKind::Deploy, &cli.file, &config, &args),
    Commands::Remove(args) => cmd_run(ScriptKind::Remove, &cli.file, &config, &args),
  }
}
