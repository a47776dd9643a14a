//! Lintel CLI library
//!
//! This library contains the CLI logic for lintel, making it reusable
//! for testing and integration with other tools.

pub mod cmd;
pub mod command;
pub mod common;
pub mod error;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use command::Command;
use common::RuntimeContext;

/// Lintel - run repository hooks against changed files
#[derive(Parser)]
#[command(name = "lintel")]
#[command(about = "Run linters, formatters and checks declared in lintel.toml")]
#[command(version)]
#[command(long_about = "Run linters, formatters and checks declared in lintel.toml

Hooks run in declaration order. Consecutive hooks that may share the
working tree run in parallel; serial hooks run alone. Tool environments
are built once per (language, dependencies) and cached.

Exit status:
  • 0  every hook passed
  • 1  a hook failed or modified files
  • 2  the run could not be planned (configuration, repository or cache)")]
pub struct Cli {
    /// Path to the config file (default: <repo>/lintel.toml)
    #[arg(long, global = true, env = "LINTEL_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (shows DEBUG level logs and hook output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a file (useful for debugging)
    #[arg(long, global = true, env = "LINTEL_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for lintel CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Run hooks on staged, changed or given files
    #[command(long_about = "Run hooks on staged, changed or given files

By default the files staged in the git index are checked.

Examples:
  • lintel run
      → Check staged files

  • lintel run --all-files
      → Check every tracked file

  • lintel run --files src/a.py src/b.py --hook-id black
      → Run one hook on two files

  • lintel run --changed-since origin/main --fail-fast
      → Check a branch, stopping after the first failing stage")]
    Run(cmd::run::RunCommand),

    /// List configured hooks
    List(cmd::list::ListCommand),

    /// Remove all cached hook environments
    Clean(cmd::clean::CleanCommand),

    /// Remove broken or unused hook environments
    Gc(cmd::gc::GcCommand),
}

/// Run the CLI and return the process exit code
///
/// # Errors
///
/// Returns an error when logging cannot be set up or a command fails
/// before hooks could report a result.
pub fn run(cli: Cli) -> Result<i32> {
    lintel_config::logging::init(cli.verbose, cli.log_file.as_deref())
        .context("Failed to initialize logging")?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "Starting lintel"
    );

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let context = RuntimeContext::new(&cwd, cli.config.as_deref(), cli.verbose);

    let code = match cli.command {
        Commands::Run(command) => command.execute(&context)?,
        Commands::List(command) => {
            command.execute(&context)?;
            0
        }
        Commands::Clean(command) => {
            command.execute(&context)?;
            0
        }
        Commands::Gc(command) => {
            command.execute(&context)?;
            0
        }
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "lintel",
            "run",
            "--files",
            "a.py",
            "b.py",
            "--hook-id",
            "black",
            "--hook-id",
            "ruff",
            "--fail-fast",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Commands::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.files.len(), 2);
        assert_eq!(run.hook_ids, ["black", "ruff"]);
        assert!(run.fail_fast);
    }

    #[test]
    fn test_all_files_conflicts_with_files() {
        assert!(Cli::try_parse_from(["lintel", "run", "--all-files", "--files", "a.py"]).is_err());
    }

    #[test]
    fn test_parse_gc_unused() {
        let cli = Cli::try_parse_from(["lintel", "gc", "--unused"]).unwrap();
        assert!(matches!(cli.command, Commands::Gc(cmd::gc::GcCommand { unused: true })));
    }
}
