//! Environment provisioning
//!
//! An environment is keyed by `(language, additional_dependencies)`. Within a
//! process every key is built at most once: the first caller runs the build,
//! concurrent callers for the same key block until it finishes and share the
//! outcome. Across processes, the [`PersistentState`] store remembers which
//! keys have a usable environment on disk.

use crate::backend;
use crate::state::{EnvironmentRecord, PersistentState, RedbPersistentState};
use lintel_config::{HookDefinition, Language};
use lintel_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use subtle::ConstantTimeEq;

/// Cache key of an environment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvKey {
    /// Language the environment is built for
    pub language: Language,
    /// Dependencies in declared order
    pub dependencies: Vec<String>,
}

impl EnvKey {
    /// Create a key
    #[must_use]
    pub fn new(language: Language, dependencies: &[String]) -> Self {
        Self {
            language,
            dependencies: dependencies.to_vec(),
        }
    }

    /// Key of the environment a hook runs in, if its language needs one
    ///
    /// For `docker_image` hooks the image (first word of `entry`) comes
    /// first, followed by the declared dependencies.
    #[must_use]
    pub fn for_hook(hook: &HookDefinition) -> Option<Self> {
        match hook.language {
            Language::DockerImage => {
                let image = hook.entry.split_whitespace().next()?.to_string();
                let mut dependencies = Vec::with_capacity(hook.additional_dependencies.len() + 1);
                dependencies.push(image);
                dependencies.extend(hook.additional_dependencies.iter().cloned());
                Some(Self {
                    language: hook.language,
                    dependencies,
                })
            }
            lang if lang.needs_environment() => {
                Some(Self::new(lang, &hook.additional_dependencies))
            }
            _ => None,
        }
    }

    /// Hex SHA-256 digest of the language and dependency list
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.language.name().as_bytes());
        for dep in &self.dependencies {
            hasher.update([0u8]);
            hasher.update(dep.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Key under which the environment is recorded in the store
    #[must_use]
    pub fn store_key(&self) -> String {
        format!("{}-{}", self.language.name(), self.fingerprint())
    }

    /// Directory name of the environment inside the environments directory
    #[must_use]
    pub fn dir_name(&self) -> String {
        let fingerprint = self.fingerprint();
        format!("{}-{}", self.language.name(), &fingerprint[..16])
    }
}

/// A ready-to-use environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    /// Key the environment was built for
    pub key: EnvKey,
    /// Directory holding the environment
    pub path: PathBuf,
}

impl Environment {
    /// Directory to prepend to `PATH`, if the language installs executables
    #[must_use]
    pub fn bin_dir(&self) -> Option<PathBuf> {
        match self.key.language {
            Language::Python => Some(self.path.join("bin")),
            Language::Node => Some(self.path.join("node_modules").join(".bin")),
            _ => None,
        }
    }

    /// `PATH` value with this environment's bin directory first
    #[must_use]
    pub fn search_path(&self, base: Option<OsString>) -> Option<OsString> {
        let mut dirs: Vec<PathBuf> = self.bin_dir().into_iter().collect();
        if let Some(base) = &base {
            dirs.extend(std::env::split_paths(base));
        }
        std::env::join_paths(dirs).ok().or(base)
    }
}

/// Builds the on-disk part of an environment
pub trait EnvironmentBuilder: Send + Sync {
    /// Populate `dir` (already created and empty) for `key`
    fn build(&self, key: &EnvKey, dir: &Path) -> Result<()>;
}

/// Builds environments with the language backends
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendBuilder;

impl EnvironmentBuilder for BackendBuilder {
    fn build(&self, key: &EnvKey, dir: &Path) -> Result<()> {
        backend::for_language(key.language).prepare(dir, key)
    }
}

/// Implement `EnvironmentBuilder` for closures
impl<F> EnvironmentBuilder for F
where
    F: Fn(&EnvKey, &Path) -> Result<()> + Send + Sync,
{
    fn build(&self, key: &EnvKey, dir: &Path) -> Result<()> {
        self(key, dir)
    }
}

/// Result of one build, shared by everyone waiting on it
type BuildOutcome = std::result::Result<Arc<Environment>, String>;

/// What [`EnvironmentProvisioner::gc`] removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Store records removed
    pub records: usize,
    /// Environment directories removed
    pub directories: usize,
}

/// Build-once cache of environments
pub struct EnvironmentProvisioner<S = RedbPersistentState, B = BackendBuilder>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    envs_dir: PathBuf,
    store: S,
    builder: B,
    cache: Mutex<HashMap<EnvKey, Arc<OnceLock<BuildOutcome>>>>,
}

impl<S: PersistentState> EnvironmentProvisioner<S, BackendBuilder> {
    /// Create a provisioner building with the language backends
    pub fn new(envs_dir: impl Into<PathBuf>, store: S) -> Self {
        Self::with_builder(envs_dir, store, BackendBuilder)
    }
}

impl<S, B> EnvironmentProvisioner<S, B>
where
    S: PersistentState,
    B: EnvironmentBuilder,
{
    /// Create a provisioner with a custom builder
    pub fn with_builder(envs_dir: impl Into<PathBuf>, store: S, builder: B) -> Self {
        Self {
            envs_dir: envs_dir.into(),
            store,
            builder,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding all environments
    #[must_use]
    pub fn envs_dir(&self) -> &Path {
        &self.envs_dir
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get or build the environment for `(language, dependencies)`
    ///
    /// # Errors
    ///
    /// Returns `Error::Environment` if the build fails. The failure is
    /// remembered for the rest of the process, so every hook sharing the key
    /// fails the same way without retrying.
    pub fn provision(&self, language: Language, dependencies: &[String]) -> Result<Arc<Environment>> {
        self.provision_key(&EnvKey::new(language, dependencies))
    }

    /// Get or build the environment for `key`
    ///
    /// # Errors
    ///
    /// See [`EnvironmentProvisioner::provision`]
    #[tracing::instrument(skip(self), fields(language = %key.language, deps = key.dependencies.len()))]
    pub fn provision_key(&self, key: &EnvKey) -> Result<Arc<Environment>> {
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|poisoned| {
                tracing::warn!("Environment cache lock was poisoned, recovering");
                poisoned.into_inner()
            });
            Arc::clone(cache.entry(key.clone()).or_default())
        };

        // Lock released: waiters block on the cell, not on the whole cache
        cell.get_or_init(|| {
            self.ensure(key)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(Error::Environment)
    }

    /// Reuse a recorded environment or build a fresh one
    fn ensure(&self, key: &EnvKey) -> Result<Environment> {
        let dir = self.envs_dir.join(key.dir_name());
        let store_key = key.store_key();
        let fingerprint = key.fingerprint();

        if let Some(record) = self.store.get(&store_key)? {
            let same = bool::from(record.fingerprint.as_bytes().ct_eq(fingerprint.as_bytes()));
            if same && record.path() == dir && dir.is_dir() {
                tracing::debug!(path = %dir.display(), "Reusing environment");
                return Ok(Environment {
                    key: key.clone(),
                    path: dir,
                });
            }
            tracing::debug!("Recorded environment is stale, rebuilding");
        }

        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        tracing::info!(path = %dir.display(), "Building environment");
        if let Err(e) = self.builder.build(key, &dir) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::warn!(error = %cleanup, "Failed to remove partial environment");
            }
            return Err(e);
        }

        self.store.put(
            &store_key,
            &EnvironmentRecord::new(
                key.language.name(),
                fingerprint,
                &dir,
                key.dependencies.clone(),
            ),
        )?;

        Ok(Environment {
            key: key.clone(),
            path: dir,
        })
    }

    /// Forget every environment handed out in this process
    ///
    /// Built environments stay on disk and in the store.
    pub fn release(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Delete every environment and every record
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the file system refuses
    pub fn purge(&self) -> Result<usize> {
        self.release();
        let count = self.store.entries()?.len();
        self.store.clear()?;
        if self.envs_dir.exists() {
            fs::remove_dir_all(&self.envs_dir)?;
        }
        tracing::info!(count, "Purged environments");
        Ok(count)
    }

    /// Remove stale environments
    ///
    /// A record is stale when it cannot be decoded, its directory is gone,
    /// or (when `live` is given) its key is not in `live`. Directories with
    /// no surviving record are removed as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the file system refuses
    pub fn gc(&self, live: Option<&HashSet<String>>) -> Result<GcReport> {
        let mut report = GcReport::default();
        let mut kept_dirs = HashSet::new();

        for (key, record) in self.store.entries()? {
            let keep = record.as_ref().is_some_and(|r| {
                r.path().is_dir() && live.is_none_or(|set| set.contains(&key))
            });
            if keep {
                if let Some(record) = record {
                    kept_dirs.insert(record.path());
                }
            } else {
                tracing::debug!(key = %key, "Removing stale environment record");
                self.store.remove(&key)?;
                report.records += 1;
            }
        }

        if self.envs_dir.is_dir() {
            for entry in fs::read_dir(&self.envs_dir)? {
                let path = entry?.path();
                if path.is_dir() && !kept_dirs.contains(&path) {
                    tracing::debug!(path = %path.display(), "Removing orphaned environment");
                    fs::remove_dir_all(&path)?;
                    report.directories += 1;
                }
            }
        }

        self.release();
        Ok(report)
    }
}
