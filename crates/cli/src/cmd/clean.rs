//! Clean command implementation
//!
//! Remove every provisioned environment and the store that records them.

use clap::Args;
use owo_colors::OwoColorize;

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Remove all cached hook environments
#[derive(Debug, Default, Args)]
pub struct CleanCommand {}

impl Command for CleanCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let settings = context.settings()?;
        let cache = context.cache_dir(&settings)?;
        let removed = context.provisioner(&settings)?.purge()?;

        println!(
            "{} {removed} environment{} from {}",
            "Removed".green(),
            if removed == 1 { "" } else { "s" },
            cache.display().dimmed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use lintel_config::{Settings, dirs};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_clean_removes_environment_directories() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        fs::write(
            dir.path().join("lintel.toml"),
            format!("[settings]\ncache_dir = \"{}\"\n", cache.display()),
        )
        .unwrap();
        let context = RuntimeContext::new(dir.path(), None, false);
        let settings: Settings = context.settings().unwrap();
        let cache = context.cache_dir(&settings).unwrap();

        let leftover = dirs::environments_dir(&cache).join("python-0123456789abcdef");
        fs::create_dir_all(&leftover).unwrap();

        CleanCommand::default().execute(&context).unwrap();
        assert!(!Path::new(&leftover).exists());
    }
}
