//! Hook registry
//!
//! Turns a parsed [`ConfigFile`] into a flat, declaration-ordered list of
//! immutable [`HookDefinition`]s. Structural problems (duplicate ids, missing
//! entries, conflicting hints) are fatal. A hook whose own `files`/`exclude`
//! regex does not compile is dropped from the registry with a warning and the
//! rest of the configuration stays usable.

use crate::config::{ConfigFile, HookConfig, Language, RepoConfig, Settings};
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Compiled inclusion/exclusion pair
///
/// Patterns are searched anywhere in the path (not anchored). Exclusion
/// always wins over inclusion.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    files: Option<Regex>,
    exclude: Option<Regex>,
}

impl FileFilter {
    /// Create a filter from already compiled patterns
    #[must_use]
    pub fn new(files: Option<Regex>, exclude: Option<Regex>) -> Self {
        Self { files, exclude }
    }

    /// Compile a filter; empty strings mean "no pattern"
    ///
    /// # Errors
    ///
    /// Returns `Error::Pattern` naming the owner and the offending field
    pub fn compile(owner: &str, files: &str, exclude: &str) -> Result<Self> {
        Ok(Self {
            files: compile_pattern(owner, "files", files)?,
            exclude: compile_pattern(owner, "exclude", exclude)?,
        })
    }

    /// Whether a normalized relative path passes the filter
    #[must_use]
    pub fn admits(&self, path: &str) -> bool {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(path)) {
            return false;
        }
        self.files.as_ref().is_none_or(|re| re.is_match(path))
    }

    /// Inclusion pattern, if any
    #[must_use]
    pub fn files_pattern(&self) -> Option<&Regex> {
        self.files.as_ref()
    }

    /// Exclusion pattern, if any
    #[must_use]
    pub fn exclude_pattern(&self) -> Option<&Regex> {
        self.exclude.as_ref()
    }
}

fn compile_pattern(owner: &str, field: &'static str, pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern).map(Some).map_err(|e| Error::Pattern {
        hook: owner.to_string(),
        field,
        message: e.to_string(),
    })
}

/// Compiled `pygrep` entry
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    /// Pattern to search for
    pub regex: Regex,
    /// Fail files that do NOT contain a match
    pub negate: bool,
    /// Match against the whole file instead of line by line
    pub multiline: bool,
}

impl PatternMatcher {
    /// Flags understood in a `pygrep` hook's `args`
    pub const FLAGS: [&'static str; 3] = ["--negate", "--ignore-case", "--multiline"];

    fn compile(hook: &str, entry: &str, args: &[String]) -> Result<Self> {
        let has = |flag: &str| args.iter().any(|a| a == flag);
        if let Some(unknown) = args.iter().find(|a| !Self::FLAGS.contains(&a.as_str())) {
            return Err(Error::Config(format!(
                "Hook '{hook}' passes unsupported pygrep argument '{unknown}'"
            )));
        }

        let multiline = has("--multiline");
        let regex = RegexBuilder::new(entry)
            .case_insensitive(has("--ignore-case"))
            .multi_line(multiline)
            .dot_matches_new_line(multiline)
            .build()
            .map_err(|e| Error::Pattern {
                hook: hook.to_string(),
                field: "entry",
                message: e.to_string(),
            })?;

        Ok(Self {
            regex,
            negate: has("--negate"),
            multiline,
        })
    }
}

/// Built-in check run by a `meta` hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCheck {
    /// Fail when a hook selects no file of the candidate set
    HooksApply,
    /// Fail when an exclude pattern matches no candidate file
    UselessExcludes,
    /// Print the selected files and pass
    Identity,
}

impl MetaCheck {
    /// Resolve a `meta` hook's entry
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown check name
    pub fn from_entry(entry: &str) -> Result<Self> {
        match entry.trim() {
            "check-hooks-apply" => Ok(MetaCheck::HooksApply),
            "check-useless-excludes" => Ok(MetaCheck::UselessExcludes),
            "identity" => Ok(MetaCheck::Identity),
            other => Err(Error::Config(format!("unknown meta check '{other}'"))),
        }
    }
}

/// Where a hook was declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSource {
    /// Source identifier
    pub repo: String,
    /// Pinned revision
    pub rev: Option<String>,
}

/// A validated, immutable hook
///
/// Shared between stages and worker threads as `Arc<HookDefinition>`.
#[derive(Debug, Clone)]
pub struct HookDefinition {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Command, script path, image or pattern depending on the language
    pub entry: String,
    /// Execution backend
    pub language: Language,
    /// Group the hook was declared in
    pub source: HookSource,
    /// Per-hook path filter
    pub filter: FileFilter,
    /// Required file type tags (any of)
    pub types: BTreeSet<String>,
    /// Rejected file type tags (any of)
    pub exclude_types: BTreeSet<String>,
    /// Arguments placed between the entry and the file names
    pub static_args: Vec<String>,
    /// Append selected files to the command line
    pub pass_filenames: bool,
    /// Runs alone in its own stage
    pub require_serial: bool,
    /// Runs even with no selected file
    pub always_run: bool,
    /// Extra packages for the environment, in declared order
    pub additional_dependencies: Vec<String>,
    /// Effective time budget, `None` means unbounded
    pub timeout: Option<Duration>,
    /// Compiled entry of a `pygrep` hook
    pub pattern: Option<PatternMatcher>,
    /// Resolved check of a `meta` hook
    pub meta: Option<MetaCheck>,
}

impl HookDefinition {
    /// Validate and compile one configured hook
    ///
    /// # Errors
    ///
    /// - `Error::Config` for structural problems
    /// - `Error::Pattern` when one of the hook's regexes does not compile
    pub fn from_config(hook: &HookConfig, repo: &RepoConfig, settings: &Settings) -> Result<Self> {
        if hook.id.trim().is_empty() {
            return Err(Error::Config(format!(
                "Hook in '{}' has an empty id",
                repo.repo
            )));
        }

        if hook.entry.trim().is_empty() {
            return Err(Error::Config(format!(
                "Hook '{}' has an empty entry",
                hook.id
            )));
        }

        if hook.require_serial && hook.parallel == Some(true) {
            return Err(Error::Config(format!(
                "Hook '{}' has conflicting concurrency hints: require_serial = true and parallel = true",
                hook.id
            )));
        }

        if !hook.additional_dependencies.is_empty() && !hook.language.supports_dependencies() {
            return Err(Error::Config(format!(
                "Hook '{}' declares additional_dependencies but language '{}' does not support them",
                hook.id, hook.language
            )));
        }

        if hook.language == Language::Script && Path::new(&hook.entry).is_absolute() {
            return Err(Error::Config(format!(
                "Hook '{}' is a script hook and must use a repository-relative entry",
                hook.id
            )));
        }

        let meta = match hook.language {
            Language::Meta => Some(
                MetaCheck::from_entry(&hook.entry)
                    .map_err(|e| Error::Config(format!("Hook '{}': {e}", hook.id)))?,
            ),
            _ => None,
        };

        let filter = FileFilter::compile(&hook.id, &hook.files, &hook.exclude)?;

        let (pattern, static_args) = match hook.language {
            Language::Pygrep => (
                Some(PatternMatcher::compile(&hook.id, &hook.entry, &hook.args)?),
                Vec::new(),
            ),
            _ => (None, hook.args.clone()),
        };

        let seconds = hook.timeout.unwrap_or(settings.timeout);
        let timeout = (seconds > 0).then(|| Duration::from_secs(seconds));

        Ok(Self {
            id: hook.id.clone(),
            name: hook.name.clone().unwrap_or_else(|| hook.id.clone()),
            entry: hook.entry.clone(),
            language: hook.language,
            source: HookSource {
                repo: repo.repo.clone(),
                rev: repo.rev.clone(),
            },
            filter,
            types: hook.types.iter().cloned().collect(),
            exclude_types: hook.exclude_types.iter().cloned().collect(),
            static_args,
            pass_filenames: hook.pass_filenames,
            require_serial: hook.require_serial || hook.parallel == Some(false),
            always_run: hook.always_run,
            additional_dependencies: hook.additional_dependencies.clone(),
            timeout,
            pattern,
            meta,
        })
    }
}

/// Immutable, ordered set of hook definitions for one run
///
/// Not `Clone`: rejected hooks keep their original `Error`, which may carry
/// an `io::Error`. Share it by reference or behind an `Arc`.
#[derive(Debug)]
pub struct ConfigRegistry {
    settings: Settings,
    global_filter: FileFilter,
    hooks: Vec<Arc<HookDefinition>>,
    rejected: Vec<Error>,
}

impl ConfigRegistry {
    /// Load and validate a configuration file
    ///
    /// # Errors
    ///
    /// See [`ConfigRegistry::from_config`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(ConfigFile::load(path)?)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// See [`ConfigRegistry::from_config`]
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_config(ConfigFile::from_toml_str(content)?)
    }

    /// Validate a parsed configuration
    ///
    /// # Errors
    ///
    /// - `Error::Config` on duplicate ids, an invalid global filter or any
    ///   structural problem
    /// - `Error::Pattern` when every declared hook was rejected for an
    ///   invalid pattern
    pub fn from_config(config: ConfigFile) -> Result<Self> {
        let global_filter = FileFilter::compile(
            "<settings>",
            &config.settings.files,
            &config.settings.exclude,
        )
        .map_err(|e| Error::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut hooks = Vec::with_capacity(config.hook_count());
        let mut rejected = Vec::new();

        for repo in &config.repos {
            for hook in &repo.hooks {
                if !seen.insert(hook.id.as_str()) {
                    return Err(Error::Config(format!("Duplicate hook id '{}'", hook.id)));
                }

                match HookDefinition::from_config(hook, repo, &config.settings) {
                    Ok(definition) => hooks.push(Arc::new(definition)),
                    Err(err @ Error::Pattern { .. }) => {
                        tracing::warn!(hook = %hook.id, error = %err, "Skipping hook with invalid pattern");
                        rejected.push(err);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if hooks.is_empty() && !rejected.is_empty() {
            return Err(rejected.swap_remove(0));
        }

        tracing::debug!(hooks = hooks.len(), "Loaded hook registry");

        Ok(Self {
            settings: config.settings,
            global_filter,
            hooks,
            rejected,
        })
    }

    /// Hooks in declaration order
    #[must_use]
    pub fn hooks(&self) -> &[Arc<HookDefinition>] {
        &self.hooks
    }

    /// Look up a hook by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<HookDefinition>> {
        self.hooks.iter().find(|h| h.id == id)
    }

    /// Pattern errors of hooks that were left out
    #[must_use]
    pub fn rejected(&self) -> &[Error] {
        &self.rejected
    }

    /// Run-wide settings
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Filter applied to every candidate file before per-hook matching
    #[must_use]
    pub fn global_filter(&self) -> &FileFilter {
        &self.global_filter
    }

    /// Number of usable hooks
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no usable hook exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Restrict to the given ids, keeping declaration order
    ///
    /// An empty `ids` slice selects every hook.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an id is not in the registry
    pub fn select(&self, ids: &[String]) -> Result<Vec<Arc<HookDefinition>>> {
        if ids.is_empty() {
            return Ok(self.hooks.clone());
        }

        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(Error::Config(format!("No hook with id '{unknown}'")));
        }

        Ok(self
            .hooks
            .iter()
            .filter(|h| ids.contains(&h.id))
            .cloned()
            .collect())
    }
}
