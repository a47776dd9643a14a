//! Run command implementation
//!
//! Collects candidate files, plans the selected hooks and executes the plan.

use clap::Args;
use lintel_engine::{FileRecord, FileSource, HookRunner, InvokeContext, RunOutcome, git, plan_run};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use super::OutputFormat;
use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;
use crate::output;

/// Run hooks against a set of files
#[derive(Debug, Default, Args)]
pub struct RunCommand {
    /// Run on every tracked file instead of the staged ones
    #[arg(short, long, conflicts_with_all = ["files", "changed_since"])]
    pub all_files: bool,

    /// Run on these files only
    #[arg(long, num_args = 1.., value_name = "FILE", conflicts_with = "changed_since")]
    pub files: Vec<PathBuf>,

    /// Run on files changed between REF and the working tree
    #[arg(long, value_name = "REF")]
    pub changed_since: Option<String>,

    /// Run only the hook with this id (repeatable)
    #[arg(long = "hook-id", value_name = "ID")]
    pub hook_ids: Vec<String>,

    /// Stop after the first stage with a failing hook
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

impl RunCommand {
    /// Where the candidate files come from
    pub fn source(&self) -> FileSource {
        if self.all_files {
            FileSource::AllFiles
        } else if !self.files.is_empty() {
            FileSource::Files(self.files.clone())
        } else if let Some(rev) = &self.changed_since {
            FileSource::ChangedSince(rev.clone())
        } else {
            FileSource::Staged
        }
    }

    /// Plan and execute without printing anything
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unusable, the candidate
    /// files cannot be collected or the environment store cannot be opened
    pub fn outcome(&self, context: &RuntimeContext) -> Result<RunOutcome> {
        let registry = context.load_registry()?;
        for rejected in registry.rejected() {
            eprintln!("{}: {rejected}", "Warning".yellow());
        }
        let settings = registry.settings();
        let hooks = registry.select(&self.hook_ids)?;

        let paths = git::collect_files(&context.root, &self.source())?;
        let records = FileRecord::detect_all(&context.root, paths);
        let plan = plan_run(&hooks, registry.global_filter(), &records);
        tracing::info!(
            candidates = records.len(),
            stages = plan.stages().len(),
            hooks = plan.hook_count(),
            "Planned run"
        );

        let invoke_context = InvokeContext {
            hooks: registry.hooks().to_vec(),
            global: registry.global_filter().clone(),
            candidates: records,
        };

        let provisioner = context.provisioner(settings)?;
        let runner = HookRunner::builder(&context.root, &provisioner)
            .workers(settings.worker_count())
            .fail_fast(self.fail_fast || settings.fail_fast)
            .build();

        Ok(runner.run(&plan, &invoke_context)?)
    }
}

impl Command for RunCommand {
    type Output = i32;

    fn execute(&self, context: &RuntimeContext) -> Result<i32> {
        let outcome = self.outcome(context)?;

        match self.format {
            OutputFormat::Text => print!("{}", output::render_outcome(&outcome, context.verbose)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        }

        Ok(outcome.exit_code())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use lintel_engine::HookStatus;
    use std::fs;
    use tempfile::TempDir;

    fn context(config: &str) -> (TempDir, RuntimeContext) {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join(".cache");
        fs::write(
            dir.path().join("lintel.toml"),
            format!(
                "[settings]\ncache_dir = \"{}\"\n{config}",
                cache.display()
            ),
        )
        .unwrap();
        let context = RuntimeContext::new(dir.path(), None, false);
        (dir, context)
    }

    #[test]
    fn test_source_selection() {
        let cases = [
            (RunCommand::default(), FileSource::Staged),
            (
                RunCommand {
                    all_files: true,
                    ..RunCommand::default()
                },
                FileSource::AllFiles,
            ),
            (
                RunCommand {
                    files: vec![PathBuf::from("a.py")],
                    ..RunCommand::default()
                },
                FileSource::Files(vec![PathBuf::from("a.py")]),
            ),
            (
                RunCommand {
                    changed_since: Some("main".into()),
                    ..RunCommand::default()
                },
                FileSource::ChangedSince("main".into()),
            ),
        ];
        for (command, expected) in cases {
            assert_eq!(command.source(), expected);
        }
    }

    #[test]
    fn test_run_selected_hook_on_explicit_files() {
        let (dir, context) = context(
            r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "fail-txt"
entry = "no text files"
language = "fail"
files = '\.txt$'

[[repos.hooks]]
id = "py"
entry = "echo"
language = "system"
files = '\.py$'
"#,
        );
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();

        let command = RunCommand {
            files: vec![PathBuf::from("a.py"), PathBuf::from("b.txt")],
            hook_ids: vec!["py".into()],
            ..RunCommand::default()
        };
        let outcome = command.outcome(&context).unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].status(), HookStatus::Passed);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_unknown_hook_id_is_an_error() {
        let (_dir, context) = context(
            "[[repos]]\nrepo = \"local\"\n[[repos.hooks]]\nid = \"a\"\nentry = \"true\"\nlanguage = \"system\"\n",
        );
        let command = RunCommand {
            all_files: true,
            hook_ids: vec!["missing".into()],
            ..RunCommand::default()
        };
        assert!(command.outcome(&context).is_err());
    }

    #[test]
    fn test_settings_fail_fast_applies() {
        let (_dir, context) = context(
            r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "first"
entry = "false"
language = "system"
always_run = true
require_serial = true

[[repos.hooks]]
id = "second"
entry = "true"
language = "system"
always_run = true
"#,
        );
        let fs_config = fs::read_to_string(&context.config_path).unwrap();
        fs::write(
            &context.config_path,
            fs_config.replacen("[settings]\n", "[settings]\nfail_fast = true\n", 1),
        )
        .unwrap();

        let command = RunCommand {
            all_files: true,
            ..RunCommand::default()
        };
        let outcome = command.outcome(&context).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.exit_code(), 1);
    }
}
