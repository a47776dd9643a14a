//! Subcommand interface
//!
//! Every subcommand is a clap `Args` struct that also implements [`Command`].

use crate::common::RuntimeContext;
use crate::error::Result;

/// A lintel subcommand
///
/// `run` yields the process exit code; the maintenance commands yield `()`
/// and exit 0 when they return `Ok`.
pub trait Command {
    /// Value produced on success
    type Output;

    /// Execute against the resolved repository and configuration
    ///
    /// # Errors
    ///
    /// Returns a `CommandError` when the command cannot complete. Hook
    /// failures are not errors; they show up in the output and exit code.
    fn execute(&self, context: &RuntimeContext) -> Result<Self::Output>;
}
