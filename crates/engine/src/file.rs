//! Candidate files and their type tags
//!
//! Every candidate path is inspected once per run. The resulting tag set is
//! what a hook's `types` / `exclude_types` are intersected with.

use lintel_core::RepoPath;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Bytes read from the head of a file for text/binary and shebang sniffing
const SNIFF_LEN: usize = 1024;

/// A candidate file with the type tags detected for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Normalized repository-relative path
    pub path: RepoPath,
    /// Detected type tags (`file`, `text`, `python`, ...)
    pub detected_types: BTreeSet<String>,
}

impl FileRecord {
    /// Create a record with explicit tags
    pub fn new<I, T>(path: RepoPath, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            path,
            detected_types: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Inspect a file under `root` and tag it
    ///
    /// Tags come from the file system (`file`, `symlink`, `executable`), the
    /// content (`text`/`binary`, shebang interpreter) and the name (extension
    /// or special file names). A path that cannot be inspected only gets the
    /// name-based tags.
    #[must_use]
    pub fn detect(root: &Path, path: RepoPath) -> Self {
        let mut tags = BTreeSet::new();
        let full = path.to_path(root);

        if let Ok(meta) = fs::symlink_metadata(&full) {
            if meta.file_type().is_symlink() {
                tags.insert("symlink".to_string());
                return Self {
                    path,
                    detected_types: tags,
                };
            }

            if meta.is_file() {
                tags.insert("file".to_string());
                tags.insert(
                    if is_executable(&meta) {
                        "executable"
                    } else {
                        "non-executable"
                    }
                    .to_string(),
                );

                if let Ok(head) = read_head(&full) {
                    if head.contains(&0) {
                        tags.insert("binary".to_string());
                    } else {
                        tags.insert("text".to_string());
                        tags.extend(shebang_tags(&head).iter().map(|t| (*t).to_string()));
                    }
                }
            }
        }

        tags.extend(name_tags(&path).iter().map(|t| (*t).to_string()));

        Self {
            path,
            detected_types: tags,
        }
    }

    /// Tag many files in parallel, keeping input order
    #[must_use]
    pub fn detect_all(root: &Path, paths: Vec<RepoPath>) -> Vec<Self> {
        paths
            .into_par_iter()
            .map(|path| Self::detect(root, path))
            .collect()
    }

    /// Whether any of `tags` was detected for this file
    #[must_use]
    pub fn has_any(&self, tags: &BTreeSet<String>) -> bool {
        tags.iter().any(|t| self.detected_types.contains(t))
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

/// Tags implied by the file name
fn name_tags(path: &RepoPath) -> &'static [&'static str] {
    match path.file_name() {
        "Dockerfile" => return &["dockerfile"],
        "Makefile" | "makefile" | "GNUmakefile" => return &["makefile"],
        "Cargo.lock" => return &["toml"],
        _ => {}
    }

    let Some(ext) = path.extension() else {
        return &[];
    };

    match ext.to_ascii_lowercase().as_str() {
        "py" => &["python"],
        "pyi" => &["python", "pyi"],
        "rs" => &["rust"],
        "js" | "mjs" | "cjs" => &["javascript"],
        "jsx" => &["javascript", "jsx"],
        "ts" | "mts" | "cts" => &["ts"],
        "tsx" => &["tsx"],
        "json" => &["json"],
        "yaml" | "yml" => &["yaml"],
        "toml" => &["toml"],
        "md" | "markdown" => &["markdown"],
        "sh" => &["shell", "sh"],
        "bash" => &["shell", "bash"],
        "zsh" => &["shell", "zsh"],
        "go" => &["go"],
        "c" | "h" => &["c"],
        "cc" | "cpp" | "cxx" | "hpp" => &["c++"],
        "java" => &["java"],
        "rb" => &["ruby"],
        "pl" | "pm" => &["perl"],
        "html" | "htm" => &["html"],
        "css" => &["css"],
        "xml" => &["xml"],
        "ini" | "cfg" => &["ini"],
        "txt" => &["plain-text"],
        "dockerfile" => &["dockerfile"],
        "png" | "jpg" | "jpeg" | "gif" | "ico" | "webp" => &["image"],
        _ => &[],
    }
}

/// Tags implied by a `#!` line at the start of `head`
///
/// - `#!/bin/bash` → `shell`, `bash`
/// - `#!/usr/bin/env python3` → `python`
fn shebang_tags(head: &[u8]) -> &'static [&'static str] {
    let Some(rest) = head.strip_prefix(b"#!") else {
        return &[];
    };
    let line = String::from_utf8_lossy(rest.split(|b| *b == b'\n').next().unwrap_or_default());
    let mut parts = line.split_whitespace();

    let Some(first) = parts.next() else {
        return &[];
    };
    let mut interpreter = first.rsplit('/').next().unwrap_or(first);
    if interpreter == "env" {
        // Skip `env -S` style flags
        match parts.find(|p| !p.starts_with('-')) {
            Some(next) => interpreter = next,
            None => return &[],
        }
    }

    let base = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    match base {
        "python" | "pypy" => &["python"],
        "sh" => &["shell", "sh"],
        "bash" => &["shell", "bash"],
        "zsh" => &["shell", "zsh"],
        "node" | "nodejs" => &["javascript"],
        "ruby" => &["ruby"],
        "perl" => &["perl"],
        _ => &[],
    }
}
