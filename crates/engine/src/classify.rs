//! File classification
//!
//! Decides which candidate files each hook receives. A file is selected for a
//! hook when it passes the global filter, the hook's `files`/`exclude`
//! patterns and its `types`/`exclude_types` tags. Any exclusion wins.
//! Matching is pure: the same records and hooks always yield the same
//! selections.

use crate::file::FileRecord;
use lintel_config::{FileFilter, HookDefinition};
use lintel_core::RepoPath;
use rayon::prelude::*;
use std::sync::Arc;

/// Files selected for one hook
#[derive(Debug, Clone)]
pub struct Selection {
    /// The hook
    pub hook: Arc<HookDefinition>,
    /// Selected files, in candidate order
    pub files: Vec<RepoPath>,
}

impl Selection {
    /// Whether this hook ends up in an execution plan
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.hook.always_run || !self.files.is_empty()
    }
}

/// Matches candidate files against hook rules
#[derive(Debug, Clone, Copy)]
pub struct FileClassifier<'a> {
    global: &'a FileFilter,
}

impl<'a> FileClassifier<'a> {
    /// Create a classifier applying `global` before any per-hook rule
    #[must_use]
    pub fn new(global: &'a FileFilter) -> Self {
        Self { global }
    }

    /// Whether `record` is selected by `hook`
    #[must_use]
    pub fn matches(&self, hook: &HookDefinition, record: &FileRecord) -> bool {
        let path = record.path.as_str();
        self.global.admits(path)
            && hook.filter.admits(path)
            && (hook.types.is_empty() || record.has_any(&hook.types))
            && !record.has_any(&hook.exclude_types)
    }

    /// Select files for every hook, preserving hook order
    ///
    /// Hooks are matched in parallel; the indexed collect keeps declaration
    /// order. Hooks that select nothing are still returned; planning decides
    /// what to do with them.
    #[must_use]
    pub fn classify(&self, hooks: &[Arc<HookDefinition>], records: &[FileRecord]) -> Vec<Selection> {
        hooks
            .par_iter()
            .map(|hook| {
                let files: Vec<RepoPath> = records
                    .iter()
                    .filter(|record| self.matches(hook, record))
                    .map(|record| record.path.clone())
                    .collect();

                tracing::debug!(
                    hook = %hook.id,
                    selected = files.len(),
                    candidates = records.len(),
                    "Classified files"
                );

                Selection {
                    hook: Arc::clone(hook),
                    files,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use lintel_config::ConfigRegistry;

    fn record(path: &str, tags: &[&str]) -> FileRecord {
        FileRecord::new(RepoPath::new(path).unwrap(), tags.iter().copied())
    }

    fn registry(hooks: &str) -> ConfigRegistry {
        ConfigRegistry::from_toml_str(&format!("[[repos]]\nrepo = \"local\"\n{hooks}")).unwrap()
    }

    fn selected<'a>(selections: &'a [Selection], id: &str) -> Vec<&'a str> {
        selections
            .iter()
            .find(|s| s.hook.id == id)
            .unwrap()
            .files
            .iter()
            .map(RepoPath::as_str)
            .collect()
    }

    #[test]
    fn test_files_pattern_selects_python_only() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "A"
entry = "check"
language = "system"
files = '\.py$'
"#,
        );
        let records = vec![record("a.py", &["file"]), record("b.txt", &["file"])];
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        assert_eq!(selected(&selections, "A"), vec!["a.py"]);
    }

    #[test]
    fn test_exclusion_dominates_inclusion() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "h"
entry = "check"
language = "system"
files = '\.py$'
exclude = '^gen/'
"#,
        );
        let records = vec![record("gen/a.py", &[]), record("src/a.py", &[])];
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        assert_eq!(selected(&selections, "h"), vec!["src/a.py"]);
    }

    #[test]
    fn test_types_intersection_and_exclude_types() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "h"
entry = "check"
language = "system"
types = ["python", "shell"]
exclude_types = ["binary"]
"#,
        );
        let records = vec![
            record("a.py", &["file", "text", "python"]),
            record("run", &["file", "text", "shell"]),
            record("weird.py", &["file", "binary", "python"]),
            record("README.md", &["file", "text", "markdown"]),
        ];
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        assert_eq!(selected(&selections, "h"), vec!["a.py", "run"]);
    }

    #[test]
    fn test_global_filter_applies_first() {
        let reg = ConfigRegistry::from_toml_str(
            r#"
[settings]
exclude = '^third_party/'

[[repos]]
repo = "local"
[[repos.hooks]]
id = "h"
entry = "check"
language = "system"
"#,
        )
        .unwrap();
        let records = vec![record("third_party/x.py", &[]), record("x.py", &[])];
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        assert_eq!(selected(&selections, "h"), vec!["x.py"]);
    }

    #[test]
    fn test_file_may_be_selected_by_several_hooks() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "one"
entry = "a"
language = "system"
[[repos.hooks]]
id = "two"
entry = "b"
language = "system"
"#,
        );
        let records = vec![record("shared.py", &[])];
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        assert_eq!(selected(&selections, "one"), vec!["shared.py"]);
        assert_eq!(selected(&selections, "two"), vec!["shared.py"]);
    }

    #[test]
    fn test_always_run_is_runnable_without_files() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "B"
entry = "check"
language = "system"
always_run = true
[[repos.hooks]]
id = "idle"
entry = "check"
language = "system"
files = "nothing-matches-this"
"#,
        );
        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &[]);
        assert!(selections[0].is_runnable());
        assert!(selections[0].files.is_empty());
        assert!(!selections[1].is_runnable());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let reg = registry(
            r#"
[[repos.hooks]]
id = "h"
entry = "check"
language = "system"
files = '\.(py|rs)$'
types = ["text"]
"#,
        );
        let records = vec![
            record("a.py", &["text"]),
            record("b.rs", &["text"]),
            record("c.rs", &["binary"]),
        ];
        let classifier = FileClassifier::new(reg.global_filter());
        let first = classifier.classify(reg.hooks(), &records);
        let second = classifier.classify(reg.hooks(), &records);
        assert_eq!(first[0].files, second[0].files);
    }

    #[test]
    fn test_many_hooks_keep_declaration_order() {
        let hooks: String = (0..64)
            .map(|i| {
                format!(
                    "[[repos.hooks]]\nid = \"h{i:02}\"\nentry = \"check\"\nlanguage = \"system\"\nfiles = '^{}/'\n",
                    i % 4
                )
            })
            .collect();
        let reg = registry(&hooks);
        let records: Vec<_> = (0..4).map(|d| record(&format!("{d}/x.py"), &[])).collect();

        let selections = FileClassifier::new(reg.global_filter()).classify(reg.hooks(), &records);
        let ids: Vec<_> = selections.iter().map(|s| s.hook.id.clone()).collect();
        let expected: Vec<_> = (0..64).map(|i| format!("h{i:02}")).collect();
        assert_eq!(ids, expected);

        for (i, selection) in selections.iter().enumerate() {
            assert_eq!(selection.files, vec![RepoPath::new(format!("{}/x.py", i % 4)).unwrap()]);
        }
    }
}
