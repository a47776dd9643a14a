//! # Lintel Engine
//!
//! Classification, scheduling and execution of hooks.
//!
//! A run flows through these modules in order:
//!
//! - **git**: collect candidate files (staged, all, explicit or changed since a revision)
//! - **file**: tag every candidate with its detected types
//! - **classify**: select files per hook (global filter, hook filter, types)
//! - **scheduler**: group selections into serial and parallel stages
//! - **env**: build-once cache of language environments, persisted in **state**
//! - **backend** / **invoker**: run one hook and detect modifications via **hash**
//! - **runner** / **report**: execute the plan and aggregate results in declaration order

pub mod backend;
pub mod classify;
pub mod env;
pub mod file;
pub mod git;
pub mod hash;
pub mod invoker;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod state;

// Re-export error types from core
pub use lintel_core::{Error, RepoPath, Result};

// Re-export commonly used types
pub use backend::{InvokeContext, LanguageBackend};
pub use classify::{FileClassifier, Selection};
pub use env::{EnvKey, Environment, EnvironmentProvisioner, GcReport};
pub use file::FileRecord;
pub use git::FileSource;
pub use invoker::Invoker;
pub use report::{ErrorKind, HookResult, HookStatus, ResultAggregator, RunOutcome};
pub use runner::{HookRunner, HookRunnerBuilder, plan_run};
pub use scheduler::{ExecutionPlan, Scheduler, Stage};
pub use state::{PersistentState, RedbPersistentState};
