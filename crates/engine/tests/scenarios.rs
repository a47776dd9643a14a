//! End-to-end runs: configuration file on disk, candidate collection,
//! classification, scheduling, execution and aggregation

use lintel_config::ConfigRegistry;
use lintel_engine::{
    EnvironmentProvisioner, FileRecord, FileSource, HookRunner, HookStatus, InvokeContext,
    RedbPersistentState, RunOutcome, git, plan_run,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Repo {
    dir: TempDir,
}

impl Repo {
    fn new(config: &str, files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lintel.toml"), config).unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn run(&self, files: &[&str], fail_fast: bool) -> RunOutcome {
        let registry = ConfigRegistry::load(self.root().join("lintel.toml")).unwrap();
        let source = FileSource::Files(files.iter().map(PathBuf::from).collect());
        let paths = git::collect_files(self.root(), &source).unwrap();
        let records = FileRecord::detect_all(self.root(), paths);

        let plan = plan_run(registry.hooks(), registry.global_filter(), &records);
        let context = InvokeContext {
            hooks: registry.hooks().to_vec(),
            global: registry.global_filter().clone(),
            candidates: records,
        };

        let cache = self.root().join(".cache");
        let store = RedbPersistentState::new(cache.join("environments.redb")).unwrap();
        let provisioner = EnvironmentProvisioner::new(cache.join("envs"), store);
        HookRunner::builder(self.root(), &provisioner)
            .workers(registry.settings().worker_count())
            .fail_fast(fail_fast)
            .build()
            .run(&plan, &context)
            .unwrap()
    }
}

#[test]
fn test_only_matching_files_are_passed() {
    let repo = Repo::new(
        r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "A"
entry = "echo"
language = "system"
files = '\.py$'
"#,
        &[("a.py", "print(1)\n"), ("b.txt", "text\n")],
    );

    let outcome = repo.run(&["a.py", "b.txt"], false);
    let a = outcome.result("A").unwrap();
    assert_eq!(a.stdout.trim(), "a.py");
    assert_eq!(a.status(), HookStatus::Passed);
    assert_eq!(outcome.exit_code(), 0);
}

#[test]
fn test_always_run_without_files_gets_no_arguments() {
    let repo = Repo::new(
        r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "B"
entry = "echo marker"
language = "system"
always_run = true
"#,
        &[],
    );

    let outcome = repo.run(&[], false);
    assert_eq!(outcome.result("B").unwrap().stdout, "marker\n");
}

#[test]
fn test_parallel_results_keep_declared_order() {
    let repo = Repo::new(
        r#"
[settings]
workers = 2

[[repos]]
repo = "local"

[[repos.hooks]]
id = "C"
entry = "sh -c 'sleep 0.3; echo \"$@\"' --"
language = "system"
files = '\.py$'

[[repos.hooks]]
id = "D"
entry = "echo"
language = "system"
files = '\.rs$'
"#,
        &[("x.py", ""), ("y.rs", "")],
    );

    let outcome = repo.run(&["x.py", "y.rs"], false);
    let ids: Vec<_> = outcome.lines().map(|l| l.hook_id).collect();
    assert_eq!(ids, vec!["C", "D"]);
    assert_eq!(outcome.result("C").unwrap().stdout.trim(), "x.py");
    assert_eq!(outcome.result("D").unwrap().stdout.trim(), "y.rs");
}

#[test]
fn test_interleaved_serial_hook_runs_alone() {
    let repo = Repo::new(
        r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "C"
entry = "sh -c 'mkdir .busy && sleep 0.2 && rmdir .busy'"
language = "system"
always_run = true
pass_filenames = false

[[repos.hooks]]
id = "E"
entry = "sh -c 'mkdir .busy && sleep 0.2 && rmdir .busy'"
language = "system"
always_run = true
pass_filenames = false
require_serial = true

[[repos.hooks]]
id = "D"
entry = "sh -c 'mkdir .busy && sleep 0.2 && rmdir .busy'"
language = "system"
always_run = true
pass_filenames = false
"#,
        &[],
    );

    let outcome = repo.run(&[], false);
    let ids: Vec<_> = outcome.lines().map(|l| l.hook_id).collect();
    assert_eq!(ids, vec!["C", "E", "D"]);
    assert!(!outcome.overall_failed, "{:?}", outcome.results);
}

#[test]
fn test_fixer_modification_fails_run() {
    let repo = Repo::new(
        r#"
[[repos]]
repo = "local"

[[repos.hooks]]
id = "F"
name = "trim trailing whitespace"
entry = "sh -c 'for f in \"$@\"; do sed \"s/[[:space:]]*$//\" \"$f\" > \"$f.tmp\" && mv \"$f.tmp\" \"$f\"; done' --"
language = "system"
files = '\.py$'
"#,
        &[("x.py", "x = 1   \n")],
    );

    let outcome = repo.run(&["x.py"], false);
    let f = outcome.result("F").unwrap();
    assert_eq!(f.exit_code, 0);
    assert!(f.modified);
    assert_eq!(f.status(), HookStatus::Modified);
    assert!(outcome.overall_failed);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(fs::read_to_string(repo.root().join("x.py")).unwrap(), "x = 1\n");
}

#[test]
fn test_global_exclude_and_fail_fast() {
    let repo = Repo::new(
        r#"
[settings]
exclude = '^vendor/'

[[repos]]
repo = "local"

[[repos.hooks]]
id = "no-vendor"
entry = "sh -c 'for f in \"$@\"; do case $f in vendor/*) exit 1;; esac; done' --"
language = "system"
require_serial = true

[[repos.hooks]]
id = "forbid"
name = "forbid txt"
entry = "txt files are not allowed"
language = "fail"
files = '\.txt$'
require_serial = true

[[repos.hooks]]
id = "never"
entry = "true"
language = "system"
always_run = true
"#,
        &[("notes.txt", "x")],
    );
    fs::create_dir(repo.root().join("vendor")).unwrap();
    fs::write(repo.root().join("vendor/lib.txt"), "x").unwrap();

    let outcome = repo.run(&["notes.txt", "vendor/lib.txt"], true);
    assert_eq!(outcome.result("no-vendor").unwrap().exit_code, 0);
    let forbid = outcome.result("forbid").unwrap();
    assert_eq!(forbid.exit_code, 1);
    assert!(forbid.stdout.contains("notes.txt"));
    assert!(!forbid.stdout.contains("vendor"));

    let lines: Vec<_> = outcome.lines().map(|l| (l.hook_id, l.status)).collect();
    assert_eq!(lines.last(), Some(&("never", HookStatus::Skipped)));
}
