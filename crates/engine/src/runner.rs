//! Plan execution
//!
//! Runs an [`ExecutionPlan`] stage by stage. Hooks of a parallel stage are
//! spread over a bounded rayon pool; a serial stage runs on the calling
//! thread. A stage only starts once every hook of the previous one reported.

use crate::backend::InvokeContext;
use crate::classify::{FileClassifier, Selection};
use crate::env::{BackendBuilder, EnvKey, EnvironmentBuilder, EnvironmentProvisioner};
use crate::file::FileRecord;
use crate::invoker::{Invoker, environment_failure};
use crate::report::{HookResult, HookStatus, ResultAggregator, RunOutcome, StageBuffer};
use crate::scheduler::{ExecutionPlan, Scheduler, Stage};
use crate::state::{PersistentState, RedbPersistentState};
use indexmap::IndexMap;
use lintel_config::{FileFilter, HookDefinition};
use lintel_core::{Error, Result};
use rayon::ThreadPool;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::time::Instant;

/// Classify candidates and group the resulting selections into stages
#[must_use]
pub fn plan_run(
    hooks: &[Arc<HookDefinition>],
    global: &FileFilter,
    records: &[FileRecord],
) -> ExecutionPlan {
    Scheduler::plan(FileClassifier::new(global).classify(hooks, records))
}

/// Executes plans against a repository
///
/// Environments are shared through the provisioner, so hooks with the same
/// language and dependencies wait on a single build.
pub struct HookRunner<'a, S = RedbPersistentState, B = BackendBuilder>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    root: &'a Path,
    provisioner: &'a EnvironmentProvisioner<S, B>,
    /// Shared environment variables (Arc to avoid cloning for each hook)
    env_vars: Arc<IndexMap<String, String>>,
    workers: usize,
    fail_fast: bool,
}

impl<'a, S, B> HookRunner<'a, S, B>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    /// Create a runner with default settings
    ///
    /// For custom configuration, use [`HookRunner::builder`].
    pub fn new(root: &'a Path, provisioner: &'a EnvironmentProvisioner<S, B>) -> Self {
        Self::builder(root, provisioner).build()
    }

    /// Create a builder for configuring a `HookRunner`
    ///
    /// ```ignore
    /// let runner = HookRunner::builder(&root, &provisioner)
    ///     .workers(4)
    ///     .fail_fast(true)
    ///     .env("CI", "1")
    ///     .build();
    /// let outcome = runner.run(&plan, &context)?;
    /// ```
    pub fn builder(
        root: &'a Path,
        provisioner: &'a EnvironmentProvisioner<S, B>,
    ) -> HookRunnerBuilder<'a, S, B> {
        HookRunnerBuilder::new(root, provisioner)
    }

    /// Worker threads available to a parallel stage
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every stage of `plan` and aggregate the results
    ///
    /// Hook failures never surface as `Err`; they are part of the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker pool cannot be created
    #[tracing::instrument(skip_all, fields(stages = plan.stages().len(), hooks = plan.hook_count()))]
    pub fn run(&self, plan: &ExecutionPlan, context: &InvokeContext) -> Result<RunOutcome> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("lintel-hook-{i}"))
            .build()
            .map_err(|e| Error::Message(format!("Failed to create worker pool: {e}")))?;

        let invoker = Invoker::new(self.root, &self.env_vars, context);
        let mut aggregator = ResultAggregator::new();
        let stages = plan.stages();

        for (position, stage) in stages.iter().enumerate() {
            tracing::debug!(
                stage = position,
                hooks = stage.len(),
                serial = stage.is_serial(),
                "Executing stage"
            );

            let buffer = match stage {
                Stage::Serial(selection) => {
                    let mut buffer = StageBuffer::new(1);
                    if let Some(result) = self.run_guarded(&invoker, selection) {
                        buffer.insert(0, result);
                    }
                    buffer
                }
                Stage::Parallel(selections) => self.run_parallel(&pool, &invoker, selections),
            };
            aggregator.flush(stage, buffer);

            if self.fail_fast && aggregator.failed() {
                let remaining = &stages[position + 1..];
                if !remaining.is_empty() {
                    tracing::info!(stages = remaining.len(), "Stopping after failure (fail-fast)");
                }
                for rest in remaining {
                    aggregator.skip(rest);
                }
                break;
            }
        }

        Ok(aggregator.finish())
    }

    /// Run one parallel stage on the pool
    ///
    /// Results come back over a channel in completion order and are slotted
    /// by position, so the stage reads back in declaration order.
    fn run_parallel(
        &self,
        pool: &ThreadPool,
        invoker: &Invoker<'_>,
        selections: &[Selection],
    ) -> StageBuffer {
        let mut buffer = StageBuffer::new(selections.len());
        let (tx, rx) = mpsc::channel::<(usize, HookResult)>();

        pool.scope(|scope| {
            for (index, selection) in selections.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    if let Some(result) = self.run_guarded(invoker, selection)
                        && tx.send((index, result)).is_err()
                    {
                        tracing::warn!(hook = %selection.hook.id, "Result channel closed");
                    }
                });
            }
        });
        drop(tx);

        for (index, result) in rx {
            buffer.insert(index, result);
        }
        buffer
    }

    /// [`Self::run_one`] with a panic contained to its own hook
    ///
    /// `None` leaves the slot empty; the aggregator reports it as an
    /// execution failure.
    fn run_guarded(&self, invoker: &Invoker<'_>, selection: &Selection) -> Option<HookResult> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run_one(invoker, selection)))
            .inspect_err(|_| tracing::error!(hook = %selection.hook.id, "Hook worker panicked"))
            .ok()
    }

    /// Provision and invoke a single hook
    fn run_one(&self, invoker: &Invoker<'_>, selection: &Selection) -> HookResult {
        let hook = &selection.hook;

        // Create a span for this hook execution with structured fields
        let span = tracing::info_span!(
            "hook_execution",
            hook_id = %hook.id,
            language = %hook.language,
            files = selection.files.len(),
            serial = hook.require_serial,
        );
        let _guard = span.enter();

        let start = Instant::now();
        tracing::debug!("Starting hook execution");

        let environment = match EnvKey::for_hook(hook) {
            Some(key) => match self.provisioner.provision_key(&key) {
                Ok(environment) => Some(environment),
                Err(e) => {
                    tracing::error!(error = %e, "Environment provisioning failed");
                    return environment_failure(selection, &e, start.elapsed());
                }
            },
            None => None,
        };

        let result = invoker.run_timed(selection, environment.as_deref(), start);

        let elapsed_ms = result.duration.as_millis();
        match result.status() {
            HookStatus::Passed => tracing::debug!(elapsed_ms, "Hook passed"),
            HookStatus::Modified => tracing::warn!(elapsed_ms, "Hook modified files"),
            _ => tracing::warn!(elapsed_ms, exit_code = result.exit_code, "Hook failed"),
        }
        result
    }
}

/// Builder for creating a `HookRunner` with custom configuration
pub struct HookRunnerBuilder<'a, S = RedbPersistentState, B = BackendBuilder>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    root: &'a Path,
    provisioner: &'a EnvironmentProvisioner<S, B>,
    env_vars: IndexMap<String, String>,
    workers: usize,
    fail_fast: bool,
}

impl<'a, S, B> HookRunnerBuilder<'a, S, B>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    /// Create a new builder with required parameters
    ///
    /// This is typically called via [`HookRunner::builder`].
    pub fn new(root: &'a Path, provisioner: &'a EnvironmentProvisioner<S, B>) -> Self {
        let mut env_vars = IndexMap::new();
        env_vars.insert("LINTEL_ROOT".to_string(), root.display().to_string());

        Self {
            root,
            provisioner,
            env_vars,
            workers: std::thread::available_parallelism().map_or(1, usize::from),
            fail_fast: false,
        }
    }

    /// Bound the number of concurrently running hooks (at least 1)
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Stop scheduling new stages once a hook failed
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Add an environment variable visible to every hook
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Add multiple environment variables at once
    #[must_use]
    pub fn env_vars(mut self, vars: IndexMap<String, String>) -> Self {
        self.env_vars.extend(vars);
        self
    }

    /// Build the `HookRunner`
    pub fn build(self) -> HookRunner<'a, S, B> {
        HookRunner {
            root: self.root,
            provisioner: self.provisioner,
            env_vars: Arc::new(self.env_vars),
            workers: self.workers,
            fail_fast: self.fail_fast,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::report::ErrorKind;
    use crate::state::MockPersistentState;
    use lintel_config::ConfigRegistry;
    use lintel_core::RepoPath;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    type TestBuilder = fn(&EnvKey, &Path) -> Result<()>;

    fn ok_builder(_key: &EnvKey, dir: &Path) -> Result<()> {
        fs::write(dir.join("ready"), "ok")?;
        Ok(())
    }

    fn failing_builder(_key: &EnvKey, _dir: &Path) -> Result<()> {
        Err(Error::Environment("dependency resolution failed".into()))
    }

    struct Fixture {
        dir: TempDir,
        registry: ConfigRegistry,
    }

    impl Fixture {
        fn new(hooks: &str, files: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            for file in files {
                fs::write(dir.path().join(file), "content\n").unwrap();
            }
            let registry =
                ConfigRegistry::from_toml_str(&format!("[[repos]]\nrepo = \"local\"\n{hooks}"))
                    .unwrap();
            Self { dir, registry }
        }

        fn records(&self, files: &[&str]) -> Vec<FileRecord> {
            files
                .iter()
                .map(|f| FileRecord::detect(self.dir.path(), RepoPath::new(f).unwrap()))
                .collect()
        }

        fn run_with(
            &self,
            files: &[&str],
            builder: TestBuilder,
            configure: impl FnOnce(
                HookRunnerBuilder<'_, MockPersistentState, TestBuilder>,
            ) -> HookRunnerBuilder<'_, MockPersistentState, TestBuilder>,
        ) -> RunOutcome {
            let provisioner = EnvironmentProvisioner::with_builder(
                self.dir.path().join(".envs"),
                MockPersistentState::new(),
                builder,
            );
            let records = self.records(files);
            let plan = plan_run(
                self.registry.hooks(),
                self.registry.global_filter(),
                &records,
            );
            let context = InvokeContext {
                hooks: self.registry.hooks().to_vec(),
                global: self.registry.global_filter().clone(),
                candidates: records,
            };
            let runner = configure(HookRunner::builder(self.dir.path(), &provisioner)).build();
            runner.run(&plan, &context).unwrap()
        }

        fn run(&self, files: &[&str]) -> RunOutcome {
            self.run_with(files, ok_builder, |b| b.workers(4))
        }
    }

    #[test]
    fn test_parallel_stage_reports_in_declaration_order() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "slow"
entry = "sleep 0.3"
language = "system"
pass_filenames = false
always_run = true
[[repos.hooks]]
id = "fast"
entry = "true"
language = "system"
"#,
            &["a.py"],
        );

        let outcome = fixture.run(&["a.py"]);
        let ids: Vec<_> = outcome.lines().map(|l| l.hook_id).collect();
        assert_eq!(ids, vec!["slow", "fast"]);
        assert!(!outcome.overall_failed);
    }

    #[test]
    fn test_stages_never_overlap() {
        // Each hook holds a directory lock for a while; overlapping stages
        // would make the second mkdir fail.
        let lock = r#"entry = "sh -c 'mkdir .lock || exit 9; sleep 0.2; rmdir .lock'"
language = "system"
pass_filenames = false
always_run = true"#;
        let fixture = Fixture::new(
            &format!(
                "[[repos.hooks]]\nid = \"a\"\n{lock}\n[[repos.hooks]]\nid = \"b\"\n{lock}\nrequire_serial = true\n[[repos.hooks]]\nid = \"c\"\n{lock}\n[[repos.hooks]]\nid = \"d\"\n{lock}\nrequire_serial = true\n"
            ),
            &[],
        );

        let outcome = fixture.run(&[]);
        assert_eq!(outcome.results.len(), 4);
        assert!(
            outcome.results.iter().all(|r| r.exit_code == 0),
            "{:?}",
            outcome.results
        );
    }

    #[test]
    fn test_parallel_hooks_overlap() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "one"
entry = "sleep 0.5"
language = "system"
pass_filenames = false
always_run = true
[[repos.hooks]]
id = "two"
entry = "sleep 0.5"
language = "system"
pass_filenames = false
always_run = true
"#,
            &[],
        );

        let start = Instant::now();
        let outcome = fixture.run(&[]);
        assert!(!outcome.overall_failed);
        assert!(start.elapsed() < Duration::from_millis(950));
    }

    #[test]
    fn test_fail_fast_skips_later_stages() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "broken"
entry = "false"
language = "system"
pass_filenames = false
always_run = true
require_serial = true
[[repos.hooks]]
id = "later"
entry = "true"
language = "system"
always_run = true
[[repos.hooks]]
id = "last"
entry = "true"
language = "system"
always_run = true
require_serial = true
"#,
            &[],
        );

        let outcome = fixture.run_with(&[], ok_builder, |b| b.fail_fast(true));
        assert_eq!(outcome.results.len(), 1);
        let lines: Vec<_> = outcome.lines().map(|l| (l.hook_id, l.status)).collect();
        assert_eq!(
            lines,
            vec![
                ("broken", HookStatus::Failed),
                ("later", HookStatus::Skipped),
                ("last", HookStatus::Skipped)
            ]
        );
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_without_fail_fast_every_stage_runs() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "broken"
entry = "false"
language = "system"
always_run = true
require_serial = true
[[repos.hooks]]
id = "later"
entry = "true"
language = "system"
always_run = true
"#,
            &[],
        );

        let outcome = fixture.run(&[]);
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.result("later").unwrap().status(), HookStatus::Passed);
        assert!(outcome.overall_failed);
    }

    #[test]
    fn test_environment_failure_is_isolated() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "py"
entry = "true"
language = "python"
additional_dependencies = ["black==24.1.0"]
always_run = true
[[repos.hooks]]
id = "plain"
entry = "true"
language = "system"
always_run = true
"#,
            &[],
        );

        let outcome = fixture.run_with(&[], failing_builder, |b| b);
        let py = outcome.result("py").unwrap();
        assert_eq!(py.exit_code, 1);
        assert_eq!(py.error_kind, Some(ErrorKind::Environment));
        assert!(py.stderr.contains("dependency resolution failed"));
        assert_eq!(outcome.result("plain").unwrap().exit_code, 0);
    }

    #[test]
    fn test_hooks_sharing_deps_share_one_build() {
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        fn counting(_key: &EnvKey, dir: &Path) -> Result<()> {
            BUILDS.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            fs::write(dir.join("ready"), "ok")?;
            Ok(())
        }

        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "fmt"
entry = "true"
language = "python"
additional_dependencies = ["black==24.1.0"]
always_run = true
[[repos.hooks]]
id = "check"
entry = "true"
language = "python"
additional_dependencies = ["black==24.1.0"]
always_run = true
[[repos.hooks]]
id = "other"
entry = "true"
language = "python"
additional_dependencies = ["isort==5.13.2"]
always_run = true
"#,
            &[],
        );

        let outcome = fixture.run_with(&[], counting, |b| b.workers(3));
        assert!(!outcome.overall_failed, "{:?}", outcome.results);
        assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_in_serial_stage_fails_only_that_hook() {
        fn panicking(_key: &EnvKey, _dir: &Path) -> Result<()> {
            panic!("builder bug");
        }

        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "py"
entry = "true"
language = "python"
always_run = true
require_serial = true
[[repos.hooks]]
id = "after"
entry = "true"
language = "system"
always_run = true
"#,
            &[],
        );

        let outcome = fixture.run_with(&[], panicking, |b| b);
        let ids: Vec<_> = outcome.lines().map(|l| l.hook_id).collect();
        assert_eq!(ids, vec!["py", "after"]);

        let py = outcome.result("py").unwrap();
        assert_eq!(py.status(), HookStatus::Failed);
        assert_eq!(py.error_kind, Some(ErrorKind::Execution));
        assert_eq!(outcome.result("after").unwrap().status(), HookStatus::Passed);
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_unselected_hook_does_not_run() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "py-only"
entry = "false"
language = "system"
files = '\.py$'
"#,
            &["README.md"],
        );

        let outcome = fixture.run(&["README.md"]);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_runner_env_reaches_hooks() {
        let fixture = Fixture::new(
            r#"
[[repos.hooks]]
id = "env"
entry = "sh -c 'test \"$LINTEL_TEST_VAR\" = yes'"
language = "system"
pass_filenames = false
always_run = true
"#,
            &[],
        );

        let outcome = fixture.run_with(&[], ok_builder, |b| b.env("LINTEL_TEST_VAR", "yes"));
        assert_eq!(outcome.result("env").unwrap().exit_code, 0);
    }

    #[test]
    fn test_worker_count_is_at_least_one() {
        let temp = TempDir::new().unwrap();
        let provisioner = EnvironmentProvisioner::with_builder(
            temp.path().join("envs"),
            MockPersistentState::new(),
            ok_builder as TestBuilder,
        );
        let runner = HookRunner::builder(temp.path(), &provisioner)
            .workers(0)
            .build();
        assert_eq!(runner.workers(), 1);
    }
}
