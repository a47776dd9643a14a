//! Candidate file discovery
//!
//! Hooks run over a candidate set that comes from git: the staged files by
//! default, every tracked file with `--all-files`, or the files changed since
//! a revision. An explicit file list bypasses git entirely. Outside a git
//! repository `AllFiles` falls back to walking the directory.

use git2::{Delta, Diff, Repository};
use lintel_core::{Error, RepoPath, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[inline]
#[allow(clippy::needless_pass_by_value)]
fn git_err(e: git2::Error) -> Error {
    Error::Git(e.message().to_string())
}

/// Where candidate files come from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileSource {
    /// Files staged in the index (added, copied, modified or renamed)
    #[default]
    Staged,
    /// Every tracked file
    AllFiles,
    /// An explicit list, relative to the root or absolute under it
    Files(Vec<PathBuf>),
    /// Files that differ between a revision and the working tree
    ChangedSince(String),
}

/// Find git working tree root starting from the given path
///
/// Searches upward from the given path. Bare repositories have no working
/// tree and yield `None`.
#[must_use]
pub fn find_working_tree(start_path: &Path) -> Option<PathBuf> {
    Repository::discover(start_path)
        .ok()
        .and_then(|repo| repo.workdir().map(Path::to_path_buf))
}

/// Collect candidate files under `root`
///
/// The result is sorted, free of duplicates and only holds paths that exist
/// on disk (deleted files cannot be checked).
///
/// # Errors
///
/// Returns `Error::Git` if the repository cannot be read or the revision does
/// not resolve, and a path error for explicit files outside `root`.
#[tracing::instrument(skip(root), fields(root = %root.display()))]
pub fn collect_files(root: &Path, source: &FileSource) -> Result<Vec<RepoPath>> {
    let mut files = match source {
        FileSource::Staged => staged_files(&open(root)?)?,
        FileSource::AllFiles => match Repository::open(root) {
            Ok(repo) => tracked_files(&repo)?,
            Err(_) => {
                tracing::debug!("Not a git repository, walking the directory");
                walk_files(root)?
            }
        },
        FileSource::Files(paths) => paths
            .iter()
            .map(|p| RepoPath::from_root(root, p))
            .collect::<Result<Vec<_>>>()?,
        FileSource::ChangedSince(rev) => changed_since(&open(root)?, rev)?,
    };

    files.retain(|f| {
        let exists = f.to_path(root).symlink_metadata().is_ok_and(|m| !m.is_dir());
        if !exists {
            tracing::trace!(path = %f, "Skipping missing file");
        }
        exists
    });
    files.sort();
    files.dedup();

    tracing::debug!(count = files.len(), "Collected candidate files");
    Ok(files)
}

fn open(root: &Path) -> Result<Repository> {
    Repository::open(root).map_err(git_err)
}

fn staged_files(repo: &Repository) -> Result<Vec<RepoPath>> {
    let index = repo.index().map_err(git_err)?;
    // An unborn HEAD compares against the empty tree
    let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
    let diff = repo
        .diff_tree_to_index(head_tree.as_ref(), Some(&index), None)
        .map_err(git_err)?;
    diff_paths(&diff)
}

fn tracked_files(repo: &Repository) -> Result<Vec<RepoPath>> {
    let index = repo.index().map_err(git_err)?;
    index
        .iter()
        .map(|entry| RepoPath::new(String::from_utf8_lossy(&entry.path).as_ref()))
        .collect()
}

fn changed_since(repo: &Repository, rev: &str) -> Result<Vec<RepoPath>> {
    let tree = repo
        .revparse_single(rev)
        .and_then(|object| object.peel_to_tree())
        .map_err(|e| Error::Git(format!("Cannot resolve revision '{rev}': {}", e.message())))?;
    let diff = repo
        .diff_tree_to_workdir_with_index(Some(&tree), None)
        .map_err(git_err)?;
    diff_paths(&diff)
}

fn diff_paths(diff: &Diff<'_>) -> Result<Vec<RepoPath>> {
    diff.deltas()
        .filter(|delta| delta.status() != Delta::Deleted)
        .filter_map(|delta| delta.new_file().path().map(RepoPath::new))
        .collect()
}

fn walk_files(root: &Path) -> Result<Vec<RepoPath>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|e| Error::Path(format!("Failed to walk directory: {e}")))?;
        if entry.file_type().is_dir() {
            continue;
        }
        files.push(RepoPath::from_root(root, entry.path())?);
    }
    Ok(files)
}
