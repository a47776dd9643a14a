//! Common utilities and types shared across CLI commands

use crate::error::{CommandError, Result};
use lintel_config::config::CONFIG_FILE_NAME;
use lintel_config::{ConfigRegistry, Settings, dirs};
use lintel_engine::{EnvironmentProvisioner, RedbPersistentState, git};
use std::path::{Path, PathBuf};

/// Runtime context for CLI commands
///
/// Holds what every command needs: where the repository is, which
/// configuration file applies, and how chatty to be.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Repository root (git working tree, or the current directory outside git)
    pub root: PathBuf,
    /// Configuration file
    pub config_path: PathBuf,
    /// Print captured hook output for every non-passing hook
    pub verbose: bool,
}

impl RuntimeContext {
    /// Resolve the repository root and configuration file from `cwd`
    ///
    /// A relative `config` is taken relative to `cwd`.
    pub fn new(cwd: &Path, config: Option<&Path>, verbose: bool) -> Self {
        let root = git::find_working_tree(cwd).unwrap_or_else(|| cwd.to_path_buf());
        let config_path = match config {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => cwd.join(path),
            None => root.join(CONFIG_FILE_NAME),
        };

        tracing::debug!(
            root = %root.display(),
            config = %config_path.display(),
            "Resolved runtime context"
        );

        Self {
            root,
            config_path,
            verbose,
        }
    }

    /// Load and validate the hook registry
    ///
    /// # Errors
    ///
    /// Returns `CommandError::ConfigNotFound` if the file is missing, or the
    /// configuration error that made it unusable
    pub fn load_registry(&self) -> Result<ConfigRegistry> {
        if !self.config_path.is_file() {
            return Err(CommandError::ConfigNotFound(self.config_path.clone()));
        }
        Ok(ConfigRegistry::load(&self.config_path)?)
    }

    /// Settings of the configuration, or defaults when there is none
    ///
    /// Maintenance commands work without a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file exists but is invalid
    pub fn settings(&self) -> Result<Settings> {
        if self.config_path.is_file() {
            Ok(self.load_registry()?.settings().clone())
        } else {
            Ok(Settings::default())
        }
    }

    /// Cache directory for `settings`; a relative `cache_dir` is taken
    /// relative to the repository root
    ///
    /// # Errors
    ///
    /// Returns `CommandError::NoCacheDir` if no location can be determined
    pub fn cache_dir(&self, settings: &Settings) -> Result<PathBuf> {
        let dir = dirs::cache_dir_for(settings).ok_or(CommandError::NoCacheDir)?;
        Ok(if dir.is_absolute() {
            dir
        } else {
            self.root.join(dir)
        })
    }

    /// Open the environment store and build a provisioner over it
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be determined or the
    /// store cannot be opened (for example while another run holds it)
    pub fn provisioner(&self, settings: &Settings) -> Result<EnvironmentProvisioner> {
        let cache = self.cache_dir(settings)?;
        let store = RedbPersistentState::new(dirs::store_path(&cache))?;
        Ok(EnvironmentProvisioner::new(
            dirs::environments_dir(&cache),
            store,
        ))
    }
}
