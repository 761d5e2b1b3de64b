//! Incremental corpus sync.
//!
//! [`ContentLoader::sync`] walks a [`Corpus`], asks the [`CacheStore`]
//! which files changed, and re-chunks, re-embeds, and re-indexes only
//! those. Files that disappeared from the corpus are removed from both
//! stores.
//!
//! # Per-file flow
//!
//! ```text
//! read ─► fingerprint ─► fresh? ──yes──► skip
//!                          │no
//!                          ▼
//!          tag ─► chunk ─► embed (reusing stored vectors)
//!                          │
//!                          ▼
//!            index.replace_source ─► cache.commit
//! ```
//!
//! The cache entry is committed only when every chunk embedded, so a file
//! with failed chunks is retried on the next sync. Its good chunks are
//! indexed anyway and their vectors are reused on the retry.
//!
//! Per-file problems (unreadable file, invalid UTF-8, failed chunk) land
//! in [`SyncReport::failures`]. Configuration problems
//! ([`LoreError::DimensionMismatch`](crate::LoreError::DimensionMismatch),
//! [`LoreError::CorpusUnreadable`](crate::LoreError::CorpusUnreadable))
//! abort the sync with `Err`.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::chunk_document;
use crate::embedding::EmbeddingManager;
use crate::models::{CacheEntry, FileRecord, IndexEntry};
use crate::store::{CacheStore, VectorIndex};
use crate::tagging::{derive_tag, mask_markers};

/// A file as listed by a [`Corpus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusItem {
    /// Corpus-relative, `/`-separated.
    pub path: String,
    /// Unix seconds.
    pub modified: i64,
    pub size: u64,
}

/// Source of campaign files.
#[async_trait]
pub trait Corpus: Send + Sync {
    /// Every file currently in the corpus. An unreadable root is an error.
    async fn list(&self) -> Result<Vec<CorpusItem>>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub path: String,
    pub chunk_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub files_seen: usize,
    pub unchanged: usize,
    pub reindexed: usize,
    pub removed: usize,
    pub chunks_written: usize,
    pub embeddings_computed: usize,
    pub embeddings_reused: usize,
    pub failures: Vec<SyncFailure>,
    /// The cache store could not read its previous state.
    pub cache_degraded: bool,
}

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Files processed at once.
    pub concurrency: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            overlap_chars: 200,
            concurrency: 4,
        }
    }
}

enum FileOutcome {
    Unchanged,
    Reindexed {
        chunks: usize,
        computed: usize,
        reused: usize,
        failures: Vec<SyncFailure>,
    },
    Failed(SyncFailure),
}

pub struct ContentLoader {
    cache: Arc<dyn CacheStore>,
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<EmbeddingManager>,
    options: LoaderOptions,
}

impl ContentLoader {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingManager>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            cache,
            index,
            embeddings,
            options,
        }
    }

    /// Bring the cache and index in line with the corpus.
    pub async fn sync(&self, corpus: &dyn Corpus) -> Result<SyncReport> {
        self.embeddings.check_dimensions().await?;

        let items = corpus.list().await?;
        let mut report = SyncReport {
            files_seen: items.len(),
            cache_degraded: self.cache.is_degraded(),
            ..Default::default()
        };
        if report.cache_degraded {
            warn!("cache store is degraded, every file will be reprocessed");
        }

        let present: BTreeSet<String> = items.iter().map(|i| i.path.clone()).collect();

        let mut results = stream::iter(items)
            .map(|item| self.process_file(corpus, item))
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some(result) = results.next().await {
            match result? {
                FileOutcome::Unchanged => report.unchanged += 1,
                FileOutcome::Reindexed {
                    chunks,
                    computed,
                    reused,
                    failures,
                } => {
                    report.reindexed += 1;
                    report.chunks_written += chunks;
                    report.embeddings_computed += computed;
                    report.embeddings_reused += reused;
                    report.failures.extend(failures);
                }
                FileOutcome::Failed(failure) => report.failures.push(failure),
            }
        }
        drop(results);

        let mut known: BTreeSet<String> = self
            .cache
            .entries()
            .await?
            .into_iter()
            .map(|e| e.path)
            .collect();
        known.extend(self.index.sources().await?);
        for orphan in known.difference(&present) {
            let deleted = self.index.delete_by_source(orphan).await?;
            self.cache.remove(orphan).await?;
            info!(path = %orphan, chunks = deleted, "removed file no longer in corpus");
            report.removed += 1;
        }

        info!(
            seen = report.files_seen,
            unchanged = report.unchanged,
            reindexed = report.reindexed,
            removed = report.removed,
            failures = report.failures.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Evict the cache first so every file is re-chunked. Stored vectors
    /// are still reused for unchanged chunks.
    pub async fn sync_full(&self, corpus: &dyn Corpus) -> Result<SyncReport> {
        self.cache.evict_all().await?;
        self.sync(corpus).await
    }

    async fn process_file(&self, corpus: &dyn Corpus, item: CorpusItem) -> Result<FileOutcome> {
        let path = item.path;
        let bytes = match corpus.read(&path).await {
            Ok(b) => b,
            Err(e) => return Ok(FileOutcome::Failed(file_failure(&path, e))),
        };

        let record = FileRecord::from_bytes(path.clone(), &bytes, item.modified);
        if !self
            .cache
            .is_stale(&record, self.embeddings.model_name())
            .await?
        {
            debug!(path = %path, "unchanged");
            return Ok(FileOutcome::Unchanged);
        }

        let text = match String::from_utf8(bytes) {
            Ok(t) => t,
            Err(e) => {
                // The old content is gone; do not keep serving it.
                self.index.delete_by_source(&path).await?;
                self.cache.remove(&path).await?;
                return Ok(FileOutcome::Failed(file_failure(
                    &path,
                    anyhow::anyhow!("not valid UTF-8: {}", e),
                )));
            }
        };

        let tag = derive_tag(&path, &text);
        let chunks = chunk_document(
            &path,
            &record.fingerprint,
            &mask_markers(&text),
            &tag,
            self.options.max_chars,
            self.options.overlap_chars,
        );

        let mut embedded = self.embeddings.embed(&chunks).await?;
        let model = self.embeddings.model_name().to_string();
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .filter_map(|c| {
                embedded
                    .vectors
                    .remove(&c.id)
                    .map(|v| IndexEntry::from_chunk(c, v, &model))
            })
            .collect();
        let written = entries.len();
        self.index.replace_source(&path, entries).await?;

        let failures: Vec<SyncFailure> = embedded
            .failures
            .into_iter()
            .map(|f| SyncFailure {
                path: path.clone(),
                chunk_id: Some(f.chunk_id),
                reason: f.reason,
            })
            .collect();

        if failures.is_empty() {
            self.cache
                .commit(CacheEntry {
                    path: path.clone(),
                    fingerprint: record.fingerprint,
                    chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
                    embedding_model: model,
                    size: record.size,
                    modified: record.modified,
                    committed_at: chrono::Utc::now().timestamp(),
                })
                .await?;
            info!(path = %path, chunks = written, "indexed");
        } else {
            warn!(
                path = %path,
                failed = failures.len(),
                "indexed partially, file will be retried next sync"
            );
        }

        Ok(FileOutcome::Reindexed {
            chunks: written,
            computed: embedded.computed,
            reused: embedded.reused,
            failures,
        })
    }
}

fn file_failure(path: &str, err: anyhow::Error) -> SyncFailure {
    let reason = format!("{:#}", err);
    warn!(path = %path, %reason, "skipping file");
    SyncFailure {
        path: path.to_string(),
        chunk_id: None,
        reason,
    }
}
