//! Single hook invocation
//!
//! Wraps a backend call with the bookkeeping every hook needs: content
//! snapshots of the selected files before and after, timing, and the mapping
//! of errors onto synthesized exit codes.

use crate::backend::{self, EXIT_NOT_STARTED, EXIT_TIMEOUT, InvokeContext, InvokeRequest};
use crate::classify::Selection;
use crate::env::Environment;
use crate::hash::FileSnapshot;
use crate::report::{ErrorKind, HookResult};
use indexmap::IndexMap;
use lintel_core::Error;
use std::path::Path;
use std::time::{Duration, Instant};

/// Runs hooks and turns their outcome into [`HookResult`]s
#[derive(Debug, Clone, Copy)]
pub struct Invoker<'a> {
    root: &'a Path,
    env: &'a IndexMap<String, String>,
    context: &'a InvokeContext,
}

impl<'a> Invoker<'a> {
    /// Create an invoker rooted at `root`
    #[must_use]
    pub fn new(
        root: &'a Path,
        env: &'a IndexMap<String, String>,
        context: &'a InvokeContext,
    ) -> Self {
        Self { root, env, context }
    }

    /// Run one selected hook
    ///
    /// Never fails: timeouts and start failures are folded into the result
    /// with exit codes 124 and 127.
    #[tracing::instrument(skip_all, fields(hook = %selection.hook.id, files = selection.files.len()))]
    pub fn run(&self, selection: &Selection, environment: Option<&Environment>) -> HookResult {
        self.run_timed(selection, environment, Instant::now())
    }

    /// Like [`Invoker::run`], with the clock already started by the caller
    ///
    /// Lets provisioning time count toward the reported duration.
    pub fn run_timed(
        &self,
        selection: &Selection,
        environment: Option<&Environment>,
        start: Instant,
    ) -> HookResult {
        let hook = &selection.hook;
        let before = FileSnapshot::capture(self.root, &selection.files);

        let request = InvokeRequest {
            hook,
            files: &selection.files,
            root: self.root,
            env: self.env,
            environment,
            context: self.context,
        };
        let outcome = backend::for_language(hook.language).invoke(&request);

        let after = FileSnapshot::capture(self.root, &selection.files);
        let changed = before.changed(&after);
        if !changed.is_empty() {
            tracing::debug!(count = changed.len(), "Hook modified files");
        }
        let modified = !changed.is_empty();
        let duration = start.elapsed();

        match outcome {
            Ok(output) => {
                let error_kind = (output.exit_code != 0).then_some(ErrorKind::Execution);
                HookResult {
                    hook_id: hook.id.clone(),
                    name: hook.name.clone(),
                    exit_code: output.exit_code,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    modified,
                    error_kind,
                    duration,
                }
            }
            Err(e) => {
                let exit_code = match e {
                    Error::Timeout { .. } => EXIT_TIMEOUT,
                    _ => EXIT_NOT_STARTED,
                };
                tracing::warn!(error = %e, exit_code, "Hook did not complete");
                let mut result = HookResult::from_error(hook, &e, exit_code, duration);
                result.modified = modified;
                result
            }
        }
    }
}

/// Result for a hook whose environment could not be provisioned
#[must_use]
pub fn environment_failure(selection: &Selection, error: &Error, duration: Duration) -> HookResult {
    HookResult::from_error(&selection.hook, error, 1, duration)
}
