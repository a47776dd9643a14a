//! XDG directory utilities
//!
//! Environments are cached under `$XDG_CACHE_HOME/lintel` (usually
//! `~/.cache/lintel`), resolved with the `xdg` crate. `LINTEL_CACHE_DIR`
//! takes precedence over everything, then `settings.cache_dir`.

use crate::config::Settings;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

/// Environment variable overriding the cache location
pub const CACHE_DIR_ENV: &str = "LINTEL_CACHE_DIR";

/// Environment variable overriding the configuration file
pub const CONFIG_ENV: &str = "LINTEL_CONFIG";

/// Get the lintel cache directory
///
/// Returns `$LINTEL_CACHE_DIR`, or `$XDG_CACHE_HOME/lintel`, or `~/.cache/lintel`
#[must_use]
pub fn cache_dir() -> Option<PathBuf> {
    resolve_cache_dir(std::env::var_os(CACHE_DIR_ENV), None)
}

/// Cache directory for a run, honouring `settings.cache_dir`
#[must_use]
pub fn cache_dir_for(settings: &Settings) -> Option<PathBuf> {
    resolve_cache_dir(
        std::env::var_os(CACHE_DIR_ENV),
        settings.cache_dir.as_deref(),
    )
}

/// Pick the cache directory from an explicit override, a configured path or XDG
#[must_use]
pub fn resolve_cache_dir(env_override: Option<OsString>, configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = env_override.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    if let Some(dir) = configured {
        return Some(dir.to_path_buf());
    }
    BaseDirectories::with_prefix("lintel").get_cache_home()
}

/// Path of the environment store database inside a cache directory
#[must_use]
pub fn store_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("environments.redb")
}

/// Directory holding built environments inside a cache directory
#[must_use]
pub fn environments_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("envs")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_env_override_wins() {
        let dir = resolve_cache_dir(
            Some(OsString::from("/tmp/lintel-env")),
            Some(Path::new("/tmp/lintel-config")),
        );
        assert_eq!(dir, Some(PathBuf::from("/tmp/lintel-env")));
    }

    #[test]
    fn test_configured_dir_used_without_env() {
        let dir = resolve_cache_dir(None, Some(Path::new("/tmp/lintel-config")));
        assert_eq!(dir, Some(PathBuf::from("/tmp/lintel-config")));
    }

    #[test]
    fn test_empty_env_override_ignored() {
        let dir = resolve_cache_dir(Some(OsString::new()), Some(Path::new("/x")));
        assert_eq!(dir, Some(PathBuf::from("/x")));
    }

    #[test]
    fn test_xdg_default_contains_lintel() {
        if let Some(path) = resolve_cache_dir(None, None) {
            assert!(
                path.to_string_lossy().contains("lintel"),
                "cache dir should contain 'lintel': {path:?}"
            );
            assert!(path.is_absolute());
        }
    }

    #[test]
    fn test_layout_inside_cache_dir() {
        let cache = Path::new("/cache");
        assert!(store_path(cache).starts_with(cache));
        assert!(environments_dir(cache).ends_with("envs"));
    }
}
