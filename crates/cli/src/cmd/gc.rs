//! Gc command implementation
//!
//! Drop environments that are broken or, with `--unused`, no longer
//! referenced by the configuration.

use clap::Args;
use lintel_engine::EnvKey;
use owo_colors::OwoColorize;
use std::collections::HashSet;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Remove stale hook environments
#[derive(Debug, Default, Args)]
pub struct GcCommand {
    /// Also remove environments no configured hook needs
    #[arg(long)]
    pub unused: bool,
}

impl GcCommand {
    /// Store keys of the environments the configuration still uses
    fn live_keys(context: &RuntimeContext) -> Result<HashSet<String>> {
        let registry = context.load_registry()?;
        Ok(registry
            .hooks()
            .iter()
            .filter_map(|hook| EnvKey::for_hook(hook))
            .map(|key| key.store_key())
            .collect())
    }
}

impl Command for GcCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let settings = context.settings()?;
        let live = if self.unused {
            Some(Self::live_keys(context)?)
        } else {
            None
        };

        let report = context.provisioner(&settings)?.gc(live.as_ref())?;
        if report.records == 0 && report.directories == 0 {
            println!("{}", "Nothing to collect.".dimmed());
        } else {
            println!(
                "{} {} records and {} directories",
                "Removed".green(),
                report.records,
                report.directories
            );
        }
        Ok(())
    }
}
