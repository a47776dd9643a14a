//! Language backends
//!
//! Every [`Language`] maps to exactly one backend implementing
//! [`LanguageBackend`]. `prepare` populates an environment directory,
//! `invoke` runs one hook over its selected files.

use crate::classify::FileClassifier;
use crate::env::{EnvKey, Environment};
use crate::file::FileRecord;
use indexmap::IndexMap;
use lintel_config::{FileFilter, HookDefinition, Language, MetaCheck};
use lintel_core::{Error, RepoPath, Result};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Exit code reported for a hook killed by its time budget
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code reported for a hook whose process could not be started
pub const EXIT_NOT_STARTED: i32 = 127;

/// Captured result of a finished hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (`128 + signal` when killed by a signal)
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ProcessOutput {
    fn passed(stdout: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        }
    }

    fn failed(stdout: String) -> Self {
        Self {
            exit_code: 1,
            stdout,
            stderr: String::new(),
        }
    }
}

/// Run-wide data that in-process backends need
///
/// `meta` checks look at the whole configuration and the whole candidate set,
/// not just the files selected for themselves.
#[derive(Debug, Clone, Default)]
pub struct InvokeContext {
    /// Every hook of the run, in declaration order
    pub hooks: Vec<Arc<HookDefinition>>,
    /// Global path filter
    pub global: FileFilter,
    /// Candidate files before any filtering
    pub candidates: Vec<FileRecord>,
}

/// Everything needed to invoke one hook
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    /// The hook
    pub hook: &'a HookDefinition,
    /// Files selected for the hook
    pub files: &'a [RepoPath],
    /// Repository root, used as working directory
    pub root: &'a Path,
    /// Extra environment variables for the process
    pub env: &'a IndexMap<String, String>,
    /// Provisioned environment, for languages that need one
    pub environment: Option<&'a Environment>,
    /// Run-wide context
    pub context: &'a InvokeContext,
}

impl InvokeRequest<'_> {
    /// Arguments after the program: rest of `entry`, `args`, then files
    ///
    /// Files are only appended when `pass_filenames` is set and something was
    /// selected, so an `always_run` hook with no match gets no file arguments.
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` if `entry` cannot be split into words
    pub fn command_line(&self) -> Result<(String, Vec<String>)> {
        let mut words = shell_words::split(&self.hook.entry).map_err(|e| {
            Error::Execution(format!(
                "Failed to parse entry of hook '{}': {e}",
                self.hook.id
            ))
        })?;
        if words.is_empty() {
            return Err(Error::Execution(format!(
                "Hook '{}' has an empty entry",
                self.hook.id
            )));
        }

        let program = words.remove(0);
        words.extend(self.hook.static_args.iter().cloned());
        if self.hook.pass_filenames {
            words.extend(self.files.iter().map(|f| f.as_str().to_string()));
        }
        Ok((program, words))
    }

    fn timeout(&self) -> Option<Duration> {
        self.hook.timeout
    }
}

/// Capability shared by all execution backends
pub trait LanguageBackend: Send + Sync {
    /// Populate an environment directory for `key`
    ///
    /// Only called for languages that need an environment.
    fn prepare(&self, env_dir: &Path, key: &EnvKey) -> Result<()> {
        let _ = (env_dir, key);
        Ok(())
    }

    /// Run the hook over its selected files
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` when the hook exceeded its time budget
    /// - `Error::Execution` when the process could not be run at all
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput>;
}

/// Backend for a language
#[must_use]
pub fn for_language(language: Language) -> &'static dyn LanguageBackend {
    match language {
        Language::System => &SystemBackend,
        Language::Script => &ScriptBackend,
        Language::Python => &PythonBackend,
        Language::Node => &NodeBackend,
        Language::DockerImage => &DockerBackend,
        Language::Pygrep => &PygrepBackend,
        Language::Fail => &FailBackend,
        Language::Meta => &MetaBackend,
    }
}

/// A child process to run under a time budget
struct Process<'a> {
    hook: &'a str,
    program: OsString,
    args: Vec<String>,
    dir: &'a Path,
    env: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
}

impl<'a> Process<'a> {
    fn new(request: &InvokeRequest<'a>, program: impl Into<OsString>, args: Vec<String>) -> Self {
        Self {
            hook: &request.hook.id,
            program: program.into(),
            args,
            dir: request.root,
            env: request
                .env
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v)))
                .collect(),
            timeout: request.timeout(),
        }
    }

    fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Resolve `program` against a custom `PATH` before spawning
    fn resolve_in(mut self, search_path: Option<OsString>) -> Self {
        if let Some(path) = search_path {
            if let Ok(found) = which::which_in(&self.program, Some(&path), self.dir) {
                self.program = found.into_os_string();
            }
            self = self.env("PATH", path);
        }
        self
    }

    #[tracing::instrument(skip(self), fields(hook = %self.hook, program = ?self.program, args = self.args.len()))]
    fn run(self) -> Result<ProcessOutput> {
        let mut expr = duct::cmd(&self.program, &self.args)
            .dir(self.dir)
            .stdin_null()
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        for (key, value) in &self.env {
            expr = expr.env(key, value);
        }

        let handle = expr.start().map_err(|e| {
            Error::Execution(format!(
                "Failed to start '{}': {e}",
                self.program.to_string_lossy()
            ))
        })?;

        let output = match self.timeout {
            Some(limit) => match handle.wait_timeout(limit) {
                Ok(Some(output)) => output.clone(),
                Ok(None) => {
                    if let Err(e) = handle.kill() {
                        tracing::warn!(error = %e, "Failed to kill timed out hook");
                    }
                    return Err(Error::Timeout {
                        hook: self.hook.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
                Err(e) => return Err(Error::Execution(format!("Failed to wait for hook: {e}"))),
            },
            None => handle
                .wait()
                .map_err(|e| Error::Execution(format!("Failed to wait for hook: {e}")))?
                .clone(),
        };

        Ok(ProcessOutput {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

/// Run a setup command for an environment, failing on non-zero exit
fn setup_command(program: &Path, args: &[&str], dir: &Path) -> Result<()> {
    tracing::debug!(program = %program.display(), ?args, "Running environment setup");
    let output = duct::cmd(program, args)
        .dir(dir)
        .stdin_null()
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| Error::Environment(format!("Failed to run {}: {e}", program.display())))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Environment(format!(
            "{} {} failed:\n{}",
            program.display(),
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

fn find_tool(candidates: &[&str]) -> Result<PathBuf> {
    candidates
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            Error::Environment(format!(
                "None of {} found on PATH",
                candidates.join(", ")
            ))
        })
}

fn require_environment<'a>(request: &InvokeRequest<'a>) -> Result<&'a Environment> {
    request.environment.ok_or_else(|| {
        Error::Environment(format!(
            "Hook '{}' has no provisioned environment",
            request.hook.id
        ))
    })
}

/// `system`: entry looked up on PATH
struct SystemBackend;

impl LanguageBackend for SystemBackend {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let (program, args) = request.command_line()?;
        Process::new(request, program, args).run()
    }
}

/// `script`: entry is a path relative to the repository root
struct ScriptBackend;

impl LanguageBackend for ScriptBackend {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let (script, args) = request.command_line()?;
        let path = request.root.join(&script);
        if !path.is_file() {
            return Err(Error::Execution(format!(
                "Script not found: {}",
                path.display()
            )));
        }
        Process::new(request, path, args).run()
    }
}

/// `python`: virtualenv with pip-installed dependencies
struct PythonBackend;

impl LanguageBackend for PythonBackend {
    fn prepare(&self, env_dir: &Path, key: &EnvKey) -> Result<()> {
        let python = find_tool(&["python3", "python"])?;
        let target = env_dir.to_string_lossy();
        setup_command(&python, &["-m", "venv", &*target], env_dir)?;

        if !key.dependencies.is_empty() {
            let pip = env_dir.join("bin").join("pip");
            let mut args = vec!["install", "--disable-pip-version-check", "--quiet"];
            args.extend(key.dependencies.iter().map(String::as_str));
            setup_command(&pip, &args, env_dir)?;
        }
        Ok(())
    }

    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let env = require_environment(request)?;
        let (program, args) = request.command_line()?;
        Process::new(request, program, args)
            .env("VIRTUAL_ENV", env.path.as_os_str())
            .resolve_in(env.search_path(std::env::var_os("PATH")))
            .run()
    }
}

/// `node`: npm prefix with installed dependencies
struct NodeBackend;

impl LanguageBackend for NodeBackend {
    fn prepare(&self, env_dir: &Path, key: &EnvKey) -> Result<()> {
        if key.dependencies.is_empty() {
            return Ok(());
        }
        let npm = find_tool(&["npm"])?;
        let prefix = env_dir.to_string_lossy();
        let mut args = vec!["install", "--no-save", "--no-audit", "--no-fund", "--prefix", &*prefix];
        args.extend(key.dependencies.iter().map(String::as_str));
        setup_command(&npm, &args, env_dir)
    }

    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let env = require_environment(request)?;
        let (program, args) = request.command_line()?;
        Process::new(request, program, args)
            .env("NODE_PATH", env.path.join("node_modules").as_os_str())
            .resolve_in(env.search_path(std::env::var_os("PATH")))
            .run()
    }
}

/// `docker_image`: container with the repository mounted at `/src`
struct DockerBackend;

impl LanguageBackend for DockerBackend {
    fn prepare(&self, _env_dir: &Path, key: &EnvKey) -> Result<()> {
        let docker = find_tool(&["docker"])?;
        let image = key
            .dependencies
            .first()
            .ok_or_else(|| Error::Environment("docker_image hook without an image".into()))?;
        setup_command(&docker, &["pull", image], Path::new("."))
    }

    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        require_environment(request)?;
        let docker = find_tool(&["docker"]).map_err(|e| Error::Execution(e.to_string()))?;
        let (image, rest) = request.command_line()?;

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--volume".to_string(),
            format!("{}:/src:rw", request.root.display()),
            "--workdir".to_string(),
            "/src".to_string(),
            image,
        ];
        args.extend(rest);
        Process::new(request, docker, args).run()
    }
}

/// `pygrep`: search file contents in-process
struct PygrepBackend;

impl LanguageBackend for PygrepBackend {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let matcher = request.hook.pattern.as_ref().ok_or_else(|| {
            Error::Execution(format!("Hook '{}' has no compiled pattern", request.hook.id))
        })?;

        let mut report = String::new();
        let mut failed = false;

        for file in request.files {
            let content = match fs::read(file.to_path(request.root)) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    let _ = writeln!(report, "{file}: {e}");
                    failed = true;
                    continue;
                }
            };

            if matcher.negate {
                if !matcher.regex.is_match(&content) {
                    let _ = writeln!(report, "{file}");
                    failed = true;
                }
            } else if matcher.multiline {
                if let Some(m) = matcher.regex.find(&content) {
                    let line = content[..m.start()].matches('\n').count() + 1;
                    let _ = writeln!(report, "{file}:{line}:{}", m.as_str());
                    failed = true;
                }
            } else {
                for (idx, line) in content.lines().enumerate() {
                    if matcher.regex.is_match(line) {
                        let _ = writeln!(report, "{file}:{}:{line}", idx + 1);
                        failed = true;
                    }
                }
            }
        }

        Ok(if failed {
            ProcessOutput::failed(report)
        } else {
            ProcessOutput::passed(report)
        })
    }
}

/// `fail`: always fails, listing the offending files
struct FailBackend;

impl LanguageBackend for FailBackend {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let mut out = format!("{}\n", request.hook.entry.trim_end());
        for file in request.files {
            let _ = writeln!(out, "{file}");
        }
        Ok(ProcessOutput::failed(out))
    }
}

/// `meta`: checks of the configuration against the candidate files
struct MetaBackend;

impl LanguageBackend for MetaBackend {
    fn invoke(&self, request: &InvokeRequest<'_>) -> Result<ProcessOutput> {
        let check = request.hook.meta.ok_or_else(|| {
            Error::Execution(format!("Hook '{}' has no meta check", request.hook.id))
        })?;
        let context = request.context;
        let classifier = FileClassifier::new(&context.global);
        let mut out = String::new();

        match check {
            MetaCheck::Identity => {
                for file in request.files {
                    let _ = writeln!(out, "{file}");
                }
                return Ok(ProcessOutput::passed(out));
            }
            MetaCheck::HooksApply => {
                for hook in &context.hooks {
                    if hook.language == Language::Meta || hook.always_run {
                        continue;
                    }
                    let applies = context
                        .candidates
                        .iter()
                        .any(|record| classifier.matches(hook, record));
                    if !applies {
                        let _ = writeln!(out, "{} does not apply to this repository", hook.id);
                    }
                }
            }
            MetaCheck::UselessExcludes => {
                if let Some(exclude) = context.global.exclude_pattern()
                    && !context
                        .candidates
                        .iter()
                        .any(|r| exclude.is_match(r.path.as_str()))
                {
                    let _ = writeln!(
                        out,
                        "The global exclude pattern '{exclude}' does not match any files"
                    );
                }

                for hook in &context.hooks {
                    let Some(exclude) = hook.filter.exclude_pattern() else {
                        continue;
                    };
                    let include_only = FileFilter::new(hook.filter.files_pattern().cloned(), None);
                    let useful = context.candidates.iter().any(|record| {
                        let path = record.path.as_str();
                        context.global.admits(path)
                            && include_only.admits(path)
                            && (hook.types.is_empty() || record.has_any(&hook.types))
                            && exclude.is_match(path)
                    });
                    if !useful {
                        let _ = writeln!(
                            out,
                            "The exclude pattern '{exclude}' for {} does not match any files",
                            hook.id
                        );
                    }
                }
            }
        }

        Ok(if out.is_empty() {
            ProcessOutput::passed(out)
        } else {
            ProcessOutput::failed(out)
        })
    }
}
