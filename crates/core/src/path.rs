//! Repository-relative path type
//!
//! File selection is evaluated against normalized POSIX-style relative paths,
//! so every candidate file is converted into a [`RepoPath`] once, at the edge,
//! and matched as a plain `&str` afterwards.
//!
//! # Examples
//!
//! ```
//! use lintel_core::path::RepoPath;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = RepoPath::new("./src/../src/main.rs")?;
//! assert_eq!(path.as_str(), "src/main.rs");
//! assert_eq!(path.extension(), Some("rs"));
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A normalized, `/`-separated path relative to the repository root
///
/// Guarantees:
/// - never absolute
/// - no `.` components and no `..` components
/// - no empty components, no trailing separator
///
/// Matching on this type is case-sensitive; no case folding ever happens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Normalize a relative path
    ///
    /// # Errors
    ///
    /// Returns an error if the path is absolute, empty after normalization, or
    /// climbs above the root with `..`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lintel_core::path::RepoPath;
    ///
    /// assert!(RepoPath::new("/etc/passwd").is_err());
    /// assert!(RepoPath::new("../outside").is_err());
    /// assert_eq!(RepoPath::new("a//b/./c").unwrap().as_str(), "a/b/c");
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut parts: Vec<String> = Vec::new();

        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(Error::PathEscapesRoot {
                            path: path.to_path_buf(),
                        });
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::PathNotRelative {
                        path: path.to_path_buf(),
                    });
                }
            }
        }

        if parts.is_empty() {
            return Err(Error::Path(format!(
                "empty path after normalization: {}",
                path.display()
            )));
        }

        Ok(Self(parts.join("/")))
    }

    /// Make a repository-relative path out of a path that may be absolute
    ///
    /// Absolute paths must live under `root`.
    pub fn from_root(root: &Path, path: &Path) -> Result<Self> {
        if path.is_absolute() {
            let relative = path
                .strip_prefix(root)
                .map_err(|_| Error::PathEscapesRoot {
                    path: path.to_path_buf(),
                })?;
            Self::new(relative)
        } else {
            Self::new(path)
        }
    }

    /// Get the normalized string form (always `/`-separated)
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against a root directory
    pub fn to_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// File extension of the last component, without the dot
    ///
    /// Dotfiles such as `.bashrc` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }
}

impl TryFrom<String> for RepoPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RepoPath> for String {
    fn from(value: RepoPath) -> Self {
        value.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_normalizes_dot_components() {
        assert_eq!(RepoPath::new("./a.py").unwrap().as_str(), "a.py");
        assert_eq!(RepoPath::new("src/./lib.rs").unwrap().as_str(), "src/lib.rs");
        assert_eq!(
            RepoPath::new("src/nested/../lib.rs").unwrap().as_str(),
            "src/lib.rs"
        );
    }

    #[test]
    fn test_rejects_absolute() {
        let err = RepoPath::new("/tmp/a.py").unwrap_err();
        assert!(matches!(err, Error::PathNotRelative { .. }));
    }

    #[test]
    fn test_rejects_escape() {
        let err = RepoPath::new("a/../../b").unwrap_err();
        assert!(matches!(err, Error::PathEscapesRoot { .. }));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(RepoPath::new(".").is_err());
        assert!(RepoPath::new("").is_err());
    }

    #[test]
    fn test_case_is_preserved() {
        let path = RepoPath::new("Docs/README.MD").unwrap();
        assert_eq!(path.as_str(), "Docs/README.MD");
        assert_eq!(path.extension(), Some("MD"));
    }

    #[test]
    fn test_extension_and_file_name() {
        let path = RepoPath::new("pkg/module.tar.gz").unwrap();
        assert_eq!(path.file_name(), "module.tar.gz");
        assert_eq!(path.extension(), Some("gz"));

        let dotfile = RepoPath::new("home/.bashrc").unwrap();
        assert_eq!(dotfile.extension(), None);

        let plain = RepoPath::new("Makefile").unwrap();
        assert_eq!(plain.extension(), None);
        assert_eq!(plain.file_name(), "Makefile");
    }

    #[test]
    fn test_from_root() {
        let root = Path::new("/work/repo");
        let abs = RepoPath::from_root(root, Path::new("/work/repo/src/a.rs")).unwrap();
        assert_eq!(abs.as_str(), "src/a.rs");

        let rel = RepoPath::from_root(root, Path::new("src/b.rs")).unwrap();
        assert_eq!(rel.as_str(), "src/b.rs");

        assert!(RepoPath::from_root(root, Path::new("/elsewhere/c.rs")).is_err());
    }

    #[test]
    fn test_to_path() {
        let path = RepoPath::new("a/b.txt").unwrap();
        assert_eq!(
            path.to_path(Path::new("/root")),
            PathBuf::from("/root/a/b.txt")
        );
    }

    #[test]
    fn test_serde_round_trip_normalizes() {
        let path: RepoPath = serde_json::from_str("\"./x//y.py\"").unwrap();
        assert_eq!(path.as_str(), "x/y.py");
        assert_eq!(serde_json::to_string(&path).unwrap(), "\"x/y.py\"");
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let mut paths = vec![
            RepoPath::new("b.py").unwrap(),
            RepoPath::new("A.py").unwrap(),
            RepoPath::new("a.py").unwrap(),
        ];
        paths.sort();
        let names: Vec<_> = paths.iter().map(RepoPath::as_str).collect();
        assert_eq!(names, vec!["A.py", "a.py", "b.py"]);
    }
}
