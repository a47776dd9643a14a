//! Base error types for lintel
//!
//! Every failure class of a hook run has its own variant. Configuration-level
//! errors abort a run before anything executes; the hook-level variants
//! (`Environment`, `Execution`, `Timeout`) are folded into a per-hook result by
//! the engine and never escape a run on their own.

use std::path::PathBuf;
use thiserror::Error;

/// Base error type shared by all lintel crates
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path is absolute where a repository-relative path was expected
    #[error("Path must be relative: {path}")]
    PathNotRelative { path: PathBuf },

    /// Path climbs above the repository root
    #[error("Path escapes the repository root: {path}")]
    PathEscapesRoot { path: PathBuf },

    /// Generic path error
    #[error("Path error: {0}")]
    Path(String),

    /// Malformed configuration, duplicate hook id or unparsable field
    #[error("Configuration error: {0}")]
    Config(String),

    /// A hook declares a regular expression that does not compile
    #[error("Invalid {field} pattern for hook '{hook}': {message}")]
    Pattern {
        hook: String,
        field: &'static str,
        message: String,
    },

    /// Environment provisioning failed
    #[error("Environment error: {0}")]
    Environment(String),

    /// Hook process could not be started or run
    #[error("Hook execution error: {0}")]
    Execution(String),

    /// Hook exceeded its time budget and was terminated
    #[error("Hook '{hook}' timed out after {seconds} seconds")]
    Timeout { hook: String, seconds: u64 },

    /// Git repository access failed
    #[error("Git error: {0}")]
    Git(String),

    /// Environment store persistence error
    #[error("State error: {0}")]
    State(String),

    /// Generic error message
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Whether this error prevents a plan from being built at all
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Environment(_) | Error::Execution(_) | Error::Timeout { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
