//! CLI command implementations

pub mod clean;
pub mod gc;
pub mod list;
pub mod run;

use clap::ValueEnum;

/// Output format shared by `run` and `list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Coloured, human-readable lines
    #[default]
    Text,
    /// Machine-readable JSON on stdout
    Json,
}
