//! Configuration file model
//!
//! Mirrors the on-disk `lintel.toml` layout one to one. Nothing here is
//! validated beyond what serde enforces; [`crate::registry::ConfigRegistry`]
//! turns these raw records into checked hook definitions.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the repository root
pub const CONFIG_FILE_NAME: &str = "lintel.toml";

/// Default hook time budget in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Execution backend of a hook
///
/// This is a closed set: an unknown `language` value fails deserialization,
/// so every hook is bound to a backend when the configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Command looked up on PATH, no environment
    System,
    /// Executable path relative to the repository root
    Script,
    /// Virtualenv with pip-installed dependencies
    Python,
    /// npm prefix with installed dependencies
    Node,
    /// Container image run with the repository mounted
    DockerImage,
    /// Regex searched in file contents, no process at all
    Pygrep,
    /// Always fails
    Fail,
    /// Checks evaluated against the configuration itself
    Meta,
}

impl Language {
    /// All languages, in declaration order
    pub const ALL: [Language; 8] = [
        Language::System,
        Language::Script,
        Language::Python,
        Language::Node,
        Language::DockerImage,
        Language::Pygrep,
        Language::Fail,
        Language::Meta,
    ];

    /// Name as written in the configuration file
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Language::System => "system",
            Language::Script => "script",
            Language::Python => "python",
            Language::Node => "node",
            Language::DockerImage => "docker_image",
            Language::Pygrep => "pygrep",
            Language::Fail => "fail",
            Language::Meta => "meta",
        }
    }

    /// Whether hooks of this language need a provisioned environment
    #[must_use]
    pub fn needs_environment(self) -> bool {
        matches!(
            self,
            Language::Python | Language::Node | Language::DockerImage
        )
    }

    /// Whether `additional_dependencies` means anything for this language
    ///
    /// For `docker_image` they only extend the environment key after the
    /// image, so changing them forces a fresh pull.
    #[must_use]
    pub fn supports_dependencies(self) -> bool {
        matches!(
            self,
            Language::Python | Language::Node | Language::DockerImage
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown language '{s}'")))
    }
}

/// A single hook as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookConfig {
    /// Unique identifier
    pub id: String,

    /// Display name (defaults to the id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Command, script path, image or pattern depending on the language
    pub entry: String,

    /// Execution backend
    pub language: Language,

    /// Inclusion regex, searched anywhere in the path
    #[serde(default)]
    pub files: String,

    /// Exclusion regex, searched anywhere in the path
    #[serde(default)]
    pub exclude: String,

    /// File type tags, a file needs at least one of them
    #[serde(default)]
    pub types: Vec<String>,

    /// File type tags that deselect a file
    #[serde(default)]
    pub exclude_types: Vec<String>,

    /// Static arguments placed between the entry and the file names
    #[serde(default)]
    pub args: Vec<String>,

    /// Append selected files to the command line
    #[serde(default = "default_true")]
    pub pass_filenames: bool,

    /// Run alone in its own stage
    #[serde(default)]
    pub require_serial: bool,

    /// Concurrency hint; `false` is equivalent to `require_serial = true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    /// Run even when no file is selected
    #[serde(default)]
    pub always_run: bool,

    /// Extra packages installed into the environment
    #[serde(default)]
    pub additional_dependencies: Vec<String>,

    /// Per-hook time budget in seconds, overrides `settings.timeout`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// A group of hooks coming from one source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Source identifier (URL, `local`, `meta`, ...)
    pub repo: String,

    /// Pinned revision of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Hooks in declaration order
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
}

/// Run-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Stop after the first stage containing a failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Worker limit for parallel stages (default: available parallelism)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Default hook time budget in seconds, 0 disables the budget
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Global inclusion regex applied before per-hook matching
    #[serde(default)]
    pub files: String,

    /// Global exclusion regex applied before per-hook matching
    #[serde(default)]
    pub exclude: String,

    /// Override for the environment cache location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fail_fast: false,
            workers: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            files: String::new(),
            exclude: String::new(),
            cache_dir: None,
        }
    }
}

impl Settings {
    /// Effective worker limit, never zero
    #[must_use]
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        }
    }
}

/// Root of `lintel.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Run-wide settings
    #[serde(default)]
    pub settings: Settings,

    /// Hook groups in declaration order
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
}

impl ConfigFile {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the TOML is malformed or has unknown fields
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config TOML: {e}")))
    }

    /// Number of hooks declared across all groups
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.repos.iter().map(|r| r.hooks.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[settings]
fail_fast = true
workers = 3

[[repos]]
repo = "local"

[[repos.hooks]]
id = "ruff"
entry = "ruff check"
language = "python"
files = '\.py$'
additional_dependencies = ["ruff==0.6.0"]

[[repos.hooks]]
id = "no-tabs"
entry = '\t'
language = "pygrep"
types = ["text"]
"#;

    #[test]
    fn test_parse_sample() {
        let config = ConfigFile::from_toml_str(SAMPLE).unwrap();
        assert!(config.settings.fail_fast);
        assert_eq!(config.settings.worker_count(), 3);
        assert_eq!(config.settings.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.repos.len(), 1);
        assert_eq!(config.hook_count(), 2);

        let ruff = &config.repos[0].hooks[0];
        assert_eq!(ruff.language, Language::Python);
        assert!(ruff.pass_filenames);
        assert!(!ruff.require_serial);
        assert_eq!(ruff.additional_dependencies, vec!["ruff==0.6.0"]);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = ConfigFile::from_toml_str("").unwrap();
        assert!(!config.settings.fail_fast);
        assert!(config.repos.is_empty());
        assert!(config.settings.worker_count() >= 1);
    }

    #[test]
    fn test_zero_workers_falls_back() {
        let settings = Settings {
            workers: Some(0),
            ..Settings::default()
        };
        assert!(settings.worker_count() >= 1);
    }

    #[test]
    fn test_unknown_language_is_config_error() {
        let toml = r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "x"
entry = "x"
language = "cobol"
"#;
        let err = ConfigFile::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let toml = r#"
[[repos]]
repo = "local"
[[repos.hooks]]
id = "x"
entry = "x"
language = "system"
stages = ["commit"]
"#;
        assert!(matches!(
            ConfigFile::from_toml_str(toml).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn test_language_names_round_trip() {
        for lang in Language::ALL {
            let parsed: Language = lang.name().parse().unwrap();
            assert_eq!(parsed, lang);
        }
        assert!("docker".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_capabilities() {
        assert!(Language::Python.needs_environment());
        assert!(Language::DockerImage.needs_environment());
        assert!(Language::DockerImage.supports_dependencies());
        assert!(!Language::Fail.supports_dependencies());
        assert!(!Language::Pygrep.needs_environment());
        assert!(!Language::System.supports_dependencies());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, SAMPLE).unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.hook_count(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ConfigFile::load(temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
