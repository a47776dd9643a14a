//! Error types for CLI commands
//!
//! Library errors arrive as `lintel_core::Error`; the variants here cover what
//! only the command layer can get wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during command execution
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CommandError {
    /// No configuration file where one was expected
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Neither `LINTEL_CACHE_DIR`, `settings.cache_dir` nor XDG yielded a directory
    #[error("Could not determine cache directory. Set LINTEL_CACHE_DIR or settings.cache_dir")]
    NoCacheDir,

    /// Error from one of the lintel libraries
    #[error(transparent)]
    Lintel(#[from] lintel_core::Error),

    /// JSON rendering error
    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for command operations
pub type Result<T> = std::result::Result<T, CommandError>;
