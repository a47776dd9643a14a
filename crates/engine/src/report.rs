//! Hook results and their aggregation
//!
//! Results of a parallel stage arrive in completion order. They are slotted
//! into a [`StageBuffer`] by stage position and flushed into the
//! [`ResultAggregator`] once the stage is done, so reporting always follows
//! declaration order.

use crate::scheduler::Stage;
use lintel_config::HookDefinition;
use lintel_core::Error;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Process exit code of a clean run
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit code when a hook failed or modified files
pub const EXIT_FAILURE: i32 = 1;

/// Process exit code when no plan could be built
pub const EXIT_PLAN_ERROR: i32 = 2;

/// Why a hook failed, when it failed for a reason other than its own verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Its environment could not be provisioned
    Environment,
    /// It exited non-zero or could not be run
    Execution,
    /// It exceeded its time budget
    Timeout,
}

impl ErrorKind {
    /// Classify a hook-level error
    #[must_use]
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Environment(_) => ErrorKind::Environment,
            Error::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Execution,
        }
    }
}

/// Verdict shown for one hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    /// Exit code 0 and no file touched
    Passed,
    /// Non-zero exit code (files may also have been touched)
    Failed,
    /// Exit code 0 but selected files were rewritten
    Modified,
    /// Planned but never started because fail-fast stopped the run
    Skipped,
}

impl HookStatus {
    /// Label used in text output
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            HookStatus::Passed => "Passed",
            HookStatus::Failed => "Failed",
            HookStatus::Modified => "Modified",
            HookStatus::Skipped => "Skipped",
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome of one hook invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookResult {
    /// Hook id
    pub hook_id: String,
    /// Display name
    pub name: String,
    /// Exit code, synthesized for timeouts and start failures
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Whether any selected file changed during the run
    pub modified: bool,
    /// Failure class, `None` on success
    pub error_kind: Option<ErrorKind>,
    /// Wall-clock time including provisioning
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl HookResult {
    /// Result for a hook that never got to run because of `error`
    #[must_use]
    pub fn from_error(hook: &HookDefinition, error: &Error, exit_code: i32, duration: Duration) -> Self {
        Self {
            hook_id: hook.id.clone(),
            name: hook.name.clone(),
            exit_code,
            stdout: String::new(),
            stderr: error.to_string(),
            modified: false,
            error_kind: Some(ErrorKind::of(error)),
            duration,
        }
    }

    /// Whether this result fails the run
    #[must_use]
    pub fn failed(&self) -> bool {
        self.exit_code != 0 || self.modified
    }

    /// Verdict for display
    #[must_use]
    pub fn status(&self) -> HookStatus {
        if self.exit_code != 0 {
            HookStatus::Failed
        } else if self.modified {
            HookStatus::Modified
        } else {
            HookStatus::Passed
        }
    }
}

/// A planned hook that did not run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedHook {
    /// Hook id
    pub hook_id: String,
    /// Display name
    pub name: String,
}

/// Index-addressed results of one stage
#[derive(Debug)]
pub struct StageBuffer {
    slots: Vec<Option<HookResult>>,
}

impl StageBuffer {
    /// Buffer with one empty slot per hook of a stage
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Put the result of the hook at stage position `index`
    pub fn insert(&mut self, index: usize, result: HookResult) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(result);
        } else {
            tracing::warn!(index, "Result for a position outside the stage, dropping");
        }
    }

    /// Whether every slot is filled
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

/// Collects results in declaration order
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<HookResult>,
    skipped: Vec<SkippedHook>,
}

impl ResultAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finished stage in stage order
    ///
    /// A slot left empty (a worker that died without reporting) becomes an
    /// execution failure rather than disappearing from the report.
    pub fn flush(&mut self, stage: &Stage, buffer: StageBuffer) {
        for (selection, slot) in stage.hooks().iter().zip(buffer.slots) {
            let result = slot.unwrap_or_else(|| {
                HookResult::from_error(
                    &selection.hook,
                    &Error::Execution("hook did not report a result".into()),
                    EXIT_FAILURE,
                    Duration::ZERO,
                )
            });
            self.results.push(result);
        }
    }

    /// Record every hook of a stage that will not run
    pub fn skip(&mut self, stage: &Stage) {
        self.skipped
            .extend(stage.hooks().iter().map(|selection| SkippedHook {
                hook_id: selection.hook.id.clone(),
                name: selection.hook.name.clone(),
            }));
    }

    /// Whether any collected result fails the run
    #[must_use]
    pub fn failed(&self) -> bool {
        self.results.iter().any(HookResult::failed)
    }

    /// Finish aggregation
    #[must_use]
    pub fn finish(self) -> RunOutcome {
        let overall_failed = self.failed();
        RunOutcome {
            results: self.results,
            skipped: self.skipped,
            overall_failed,
        }
    }
}

/// One line of the final report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine<'a> {
    /// Hook id
    pub hook_id: &'a str,
    /// Display name
    pub name: &'a str,
    /// Verdict
    pub status: HookStatus,
    /// Duration, zero for skipped hooks
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Results of hooks that ran, in declaration order
    pub results: Vec<HookResult>,
    /// Hooks planned after a fail-fast stop
    pub skipped: Vec<SkippedHook>,
    /// Whether any hook failed or modified files
    pub overall_failed: bool,
}

impl RunOutcome {
    /// Process exit code for this outcome
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.overall_failed {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    }

    /// Status lines in declaration order
    pub fn lines(&self) -> impl Iterator<Item = ReportLine<'_>> {
        let ran = self.results.iter().map(|r| ReportLine {
            hook_id: &r.hook_id,
            name: &r.name,
            status: r.status(),
            duration: r.duration,
        });
        let skipped = self.skipped.iter().map(|s| ReportLine {
            hook_id: &s.hook_id,
            name: &s.name,
            status: HookStatus::Skipped,
            duration: Duration::ZERO,
        });
        ran.chain(skipped)
    }

    /// Look up a result by hook id
    #[must_use]
    pub fn result(&self, hook_id: &str) -> Option<&HookResult> {
        self.results.iter().find(|r| r.hook_id == hook_id)
    }

    /// Number of hooks that fail the run
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.failed()).count()
    }
}
