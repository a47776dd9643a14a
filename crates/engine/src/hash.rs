//! Content hashing using blake3
//!
//! Used to fingerprint a hook's selected files before and after it runs so
//! that in-place edits are detected even when the hook exits successfully.

use lintel_core::RepoPath;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Result as IoResult};
use std::path::Path;
use subtle::ConstantTimeEq;

/// Hash content using blake3
///
/// # Examples
///
/// ```
/// use lintel_engine::hash::hash_content;
///
/// let hash = hash_content(b"Hello, world!");
/// assert_eq!(hash.len(), 32);
/// ```
#[must_use]
pub fn hash_content(content: &[u8]) -> [u8; 32] {
    *blake3::hash(content).as_bytes()
}

/// Hash a file with buffered, streaming reads
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> IoResult<[u8; 32]> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(*hasher.finalize().as_bytes())
}

/// Content fingerprints of a set of files at one point in time
///
/// A file that cannot be read is recorded as `None`, so a hook that deletes
/// or creates one of its selected files still counts as a mutation.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshot {
    entries: BTreeMap<RepoPath, Option<[u8; 32]>>,
}

impl FileSnapshot {
    /// Fingerprint `files` under `root`
    #[must_use]
    pub fn capture(root: &Path, files: &[RepoPath]) -> Self {
        let entries = files
            .par_iter()
            .map(|path| (path.clone(), hash_file(&path.to_path(root)).ok()))
            .collect();
        Self { entries }
    }

    /// Number of fingerprinted files
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file was fingerprinted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths whose fingerprint differs in `after`
    #[must_use]
    pub fn changed(&self, after: &FileSnapshot) -> Vec<RepoPath> {
        self.entries
            .iter()
            .filter(|(path, before)| {
                let now = after.entries.get(*path).copied().flatten();
                match (before, now) {
                    (Some(a), Some(b)) => !bool::from(a[..].ct_eq(&b[..])),
                    (None, None) => false,
                    _ => true,
                }
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}
