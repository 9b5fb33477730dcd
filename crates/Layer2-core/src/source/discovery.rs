//! Filesystem unit discovery
//!
//! Walks the configured roots with the `ignore` walker (gitignore aware) and
//! reports every accepted file as a source unit, relative to the base
//! directory and with `/` separators.

use super::traits::UnitEnumerator;
use async_trait::async_trait;
use ignore::WalkBuilder;
use livemeta_foundation::{Error, Result, SourceConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Enumerates source units on disk
#[derive(Debug, Clone)]
pub struct WalkEnumerator {
    base: PathBuf,
    config: SourceConfig,
}

impl WalkEnumerator {
    pub fn new(base: impl Into<PathBuf>, config: SourceConfig) -> Self {
        Self {
            base: base.into(),
            config,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute path of a unit reported by this enumerator
    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.base.join(unit)
    }

    fn walk(base: &Path, config: &SourceConfig) -> Vec<String> {
        let mut units = Vec::new();

        for root in &config.roots {
            let root = base.join(root);
            if !root.exists() {
                debug!(root = %root.display(), "Skipping missing source root");
                continue;
            }

            let walker = WalkBuilder::new(&root)
                .hidden(true)
                .git_ignore(config.respect_gitignore)
                .git_global(config.respect_gitignore)
                .git_exclude(config.respect_gitignore)
                .require_git(false)
                .build();

            for entry in walker {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable path");
                        continue;
                    }
                };

                let path = entry.path();
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }

                let Ok(relative) = path.strip_prefix(base) else {
                    continue;
                };
                if !config.accepts(relative) {
                    continue;
                }

                units.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }

        units.sort();
        units.dedup();
        units
    }
}

#[async_trait]
impl UnitEnumerator for WalkEnumerator {
    async fn enumerate(&self) -> Result<Vec<String>> {
        let base = self.base.clone();
        let config = self.config.clone();

        let units = tokio::task::spawn_blocking(move || Self::walk(&base, &config))
            .await
            .map_err(|e| Error::Internal(format!("Unit discovery task failed: {}", e)))?;

        debug!(base = %self.base.display(), units = units.len(), "Discovered source units");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[tokio::test]
    async fn test_walk_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/b.rs");
        touch(dir.path(), "src/a.rs");
        touch(dir.path(), "src/nested/c.rs");
        touch(dir.path(), "src/notes.md");
        touch(dir.path(), "src/generated/d.rs");
        touch(dir.path(), "other/e.rs");

        let config = SourceConfig {
            ignore: vec!["generated".to_string()],
            ..SourceConfig::default()
        };
        let units = WalkEnumerator::new(dir.path(), config)
            .enumerate()
            .await
            .unwrap();

        assert_eq!(units, vec!["src/a.rs", "src/b.rs", "src/nested/c.rs"]);
    }

    #[tokio::test]
    async fn test_overlapping_roots_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/a.rs");
        touch(dir.path(), "src/lib/b.rs");

        let config = SourceConfig {
            roots: vec![PathBuf::from("src"), PathBuf::from("src/lib")],
            ..SourceConfig::default()
        };
        let units = WalkEnumerator::new(dir.path(), config)
            .enumerate()
            .await
            .unwrap();

        assert_eq!(units, vec!["src/a.rs", "src/lib/b.rs"]);
    }

    #[tokio::test]
    async fn test_respects_gitignore() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "src/skip.rs\n").unwrap();
        touch(dir.path(), "src/keep.rs");
        touch(dir.path(), "src/skip.rs");

        let units = WalkEnumerator::new(dir.path(), SourceConfig::default())
            .enumerate()
            .await
            .unwrap();

        assert_eq!(units, vec!["src/keep.rs"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let units = WalkEnumerator::new(dir.path(), SourceConfig::default())
            .enumerate()
            .await
            .unwrap();
        assert!(units.is_empty());
    }
}
