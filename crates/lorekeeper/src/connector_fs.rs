//! Filesystem corpus.
//!
//! Walks `corpus.root` with include/exclude globs (matched against the
//! root-relative path) and serves file bytes to the loader. Paths are
//! reported `/`-separated on every platform.

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

use lorekeeper_core::loader::{Corpus, CorpusItem};
use lorekeeper_core::LoreError;

use crate::config::CorpusConfig;

pub struct FsCorpus {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FsCorpus {
    pub fn new(config: &CorpusConfig) -> Result<Self> {
        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/.*".to_string(),
        ];
        default_excludes.extend(config.exclude_globs.clone());
        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    fn unreadable(&self, reason: impl ToString) -> anyhow::Error {
        LoreError::CorpusUnreadable {
            root: self.root.display().to_string(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn scan(&self) -> Result<Vec<CorpusItem>> {
        if !self.root.is_dir() {
            return Err(self.unreadable("not a readable directory"));
        }

        let mut items = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if e.depth() == 0 => return Err(self.unreadable(e)),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable corpus entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %rel_str, error = %e, "skipping file without metadata");
                    continue;
                }
            };
            let modified = metadata
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
                .duration_since(std::time::SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64;

            items.push(CorpusItem {
                path: rel_str,
                modified,
                size: metadata.len(),
            });
        }

        // Sort for deterministic ordering
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }
}

#[async_trait]
impl Corpus for FsCorpus {
    async fn list(&self) -> Result<Vec<CorpusItem>> {
        self.scan()
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.root.join(path);
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read {}", full.display()))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn corpus(root: &Path) -> FsCorpus {
        FsCorpus::new(&CorpusConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.md".into(), "**/*.txt".into()],
            exclude_globs: vec!["drafts/**".into()],
            follow_symlinks: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lists_matching_files_sorted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("Act I")).unwrap();
        std::fs::create_dir_all(root.join("drafts")).unwrap();
        std::fs::write(root.join("Act I/village.md"), "Village").unwrap();
        std::fs::write(root.join("act2.txt"), "Castle").unwrap();
        std::fs::write(root.join("map.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join("drafts/wip.md"), "draft").unwrap();
        std::fs::write(root.join(".hidden.md"), "hidden").unwrap();

        let c = corpus(root);
        let items = c.list().await.unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["Act I/village.md", "act2.txt"]);
        assert_eq!(items[1].size, 6);
        assert_eq!(c.read("act2.txt").await.unwrap(), b"Castle");
    }

    #[tokio::test]
    async fn test_missing_root_is_corpus_unreadable() {
        let tmp = TempDir::new().unwrap();
        let c = corpus(&tmp.path().join("nope"));
        let err = c.list().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoreError>(),
            Some(LoreError::CorpusUnreadable { .. })
        ));
    }
}
