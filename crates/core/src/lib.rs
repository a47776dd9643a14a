//! Core types and utilities for lintel
//!
//! This is the foundation crate (Layer 0) that all other lintel crates depend on.
//! It provides:
//! - The shared error type covering every failure class of a hook run
//! - `RepoPath`, the normalized repository-relative path used for file matching
//!
//! This crate has no dependencies on other lintel crates.

pub mod error;
pub mod path;

pub use error::{Error, Result};
pub use path::RepoPath;
