//! Configuration management for lintel
//!
//! This crate handles:
//! - Loading the TOML hook configuration
//! - Validating hook definitions into an immutable registry
//! - XDG cache directory resolution
//! - Logging initialization

pub mod config;
pub mod dirs;
pub mod logging;
pub mod registry;

// Re-export error types from core
pub use lintel_core::{Error, Result};

// Re-export main types
pub use config::{ConfigFile, HookConfig, Language, RepoConfig, Settings};
pub use dirs::cache_dir;
pub use registry::{
    ConfigRegistry, FileFilter, HookDefinition, HookSource, MetaCheck, PatternMatcher,
};
