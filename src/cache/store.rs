//! On-disk tool cache.
//!
//! Layout matches the GitHub Actions tool cache so installs are shared with
//! other steps on the same runner:
//!
//! ```text
//! <root>/<name>/<version>/<arch>/...      installed tree
//! <root>/<name>/<version>/<arch>.complete  written last, marks a usable entry
//! ```

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Identifies one cached installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl CacheKey {
    pub fn new(name: impl Into<String>, version: &str, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: normalize_version(version),
            arch: arch.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{} ({})", self.name, self.version, self.arch)
    }
}

/// Normalize a version the way the Actions tool cache keys it.
///
/// A full semantic version loses a leading `v` or `=`; anything else
/// (Advanced Installer uses two-part versions like `22.1`) is kept as given.
pub fn normalize_version(version: &str) -> String {
    let trimmed = version.trim();
    let stripped = trimmed.trim_start_matches(['v', '=']);
    match semver::Version::parse(stripped) {
        Ok(v) => v.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Tool cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the installed tree for `key`
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.name).join(&key.version).join(&key.arch)
    }

    fn marker_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(&key.name)
            .join(&key.version)
            .join(format!("{}.complete", key.arch))
    }

    /// Look up a complete cache entry.
    ///
    /// Returns `None` when the directory is missing or was never marked
    /// complete (an interrupted copy).
    pub fn find(&self, key: &CacheKey) -> Option<PathBuf> {
        let dir = self.entry_dir(key);
        if dir.is_dir() && self.marker_path(key).is_file() {
            Some(dir)
        } else {
            None
        }
    }

    /// Copy `source` into the cache under `key` and mark it complete.
    ///
    /// Any previous (possibly partial) entry for the key is replaced.
    pub async fn cache_dir(&self, source: &Path, key: &CacheKey) -> Result<PathBuf> {
        let source = source.to_path_buf();
        let dest = self.entry_dir(key);
        let marker = self.marker_path(key);

        tracing::debug!("Caching {} to {}", source.display(), dest.display());

        let copied = dest.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if marker.exists() {
                std::fs::remove_file(&marker)?;
            }
            if copied.exists() {
                std::fs::remove_dir_all(&copied)?;
            }
            std::fs::create_dir_all(&copied)?;
            copy_tree(&source, &copied)?;
            std::fs::write(&marker, "")?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("cache copy task failed: {}", e))??;

        Ok(dest)
    }
}

/// Recursively copy the contents of `from` into the existing directory `to`.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| anyhow::anyhow!("walking {}: {}", from.display(), e))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("22.1"), "22.1");
        assert_eq!(normalize_version(" 22.1 "), "22.1");
        assert_eq!(normalize_version("v1.2.3"), "1.2.3");
        assert_eq!(normalize_version("=1.2.3"), "1.2.3");
        // Not full semver, so the prefix stays
        assert_eq!(normalize_version("v22.1"), "v22.1");
    }

    #[test]
    fn test_cache_key_display() {
        let key = CacheKey::new("advinst", "22.1", "x86");
        assert_eq!(key.to_string(), "advinst@22.1 (x86)");
    }

    #[test]
    fn test_find_missing_entry() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(temp.path());
        assert!(cache.find(&CacheKey::new("advinst", "22.1", "x86")).is_none());
    }

    #[test]
    fn test_find_requires_complete_marker() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(temp.path());
        let key = CacheKey::new("advinst", "22.1", "x86");

        std::fs::create_dir_all(cache.entry_dir(&key)).unwrap();
        assert!(cache.find(&key).is_none());

        std::fs::write(temp.path().join("advinst/22.1/x86.complete"), "").unwrap();
        assert_eq!(cache.find(&key), Some(cache.entry_dir(&key)));
    }

    #[tokio::test]
    async fn test_cache_dir_copies_tree_and_marks_complete() {
        let temp = tempfile::tempdir().unwrap();
        let source = temp.path().join("extract");
        std::fs::create_dir_all(source.join("bin").join("x86")).unwrap();
        std::fs::write(source.join("bin").join("x86").join("tool.com"), "MZ").unwrap();
        std::fs::write(source.join("readme.txt"), "hi").unwrap();

        let cache = ToolCache::new(temp.path().join("cache"));
        let key = CacheKey::new("advinst", "22.1", "x86");

        let dest = cache.cache_dir(&source, &key).await.unwrap();
        assert_eq!(dest, cache.entry_dir(&key));
        assert_eq!(
            std::fs::read_to_string(dest.join("bin").join("x86").join("tool.com")).unwrap(),
            "MZ"
        );
        assert!(dest.join("readme.txt").is_file());
        assert_eq!(cache.find(&key), Some(dest));
    }

    #[tokio::test]
    async fn test_cache_dir_replaces_previous_entry() {
        let temp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(temp.path().join("cache"));
        let key = CacheKey::new("advinst", "22.1", "x86");

        let stale = cache.entry_dir(&key);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("stale.txt"), "old").unwrap();

        let source = temp.path().join("extract");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("fresh.txt"), "new").unwrap();

        let dest = cache.cache_dir(&source, &key).await.unwrap();
        assert!(!dest.join("stale.txt").exists());
        assert!(dest.join("fresh.txt").is_file());
    }
}
