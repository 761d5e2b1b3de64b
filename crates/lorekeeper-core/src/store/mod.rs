//! Persistence traits.
//!
//! Two independent stores back the pipeline:
//!
//! | Trait | Holds | Keyed by |
//! |-------|-------|----------|
//! | [`CacheStore`] | per-file processing results ([`CacheEntry`]) | corpus-relative path |
//! | [`VectorIndex`] | chunk vectors plus metadata ([`IndexEntry`]) | chunk ID |
//!
//! Both are async and object-safe so the loader and retriever can hold
//! `Arc<dyn …>` handles. [`memory`] provides in-memory implementations;
//! the app crate provides a JSON-file cache and a SQLite index.
//!
//! # Atomicity
//!
//! - [`CacheStore::commit`] either fully replaces an entry or leaves the
//!   previous state untouched, including across a crash.
//! - [`VectorIndex::replace_source`] swaps all of a file's entries in one
//!   critical section, so a concurrent [`VectorIndex::query`] sees either
//!   the old chunks or the new ones.

pub mod memory;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheEntry, CachedEmbedding, FileRecord, IndexEntry};

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<CacheEntry>>;

    /// A file is stale when it has no entry, its fingerprint changed, or
    /// its chunks were embedded by a model other than `model`.
    async fn is_stale(&self, record: &FileRecord, model: &str) -> Result<bool> {
        Ok(match self.get(&record.path).await? {
            Some(entry) => entry.fingerprint != record.fingerprint || entry.embedding_model != model,
            None => true,
        })
    }

    /// Insert or wholesale-replace the entry for `entry.path`.
    async fn commit(&self, entry: CacheEntry) -> Result<()>;

    /// Remove one entry; returns whether it existed.
    async fn remove(&self, path: &str) -> Result<bool>;

    async fn entries(&self) -> Result<Vec<CacheEntry>>;

    /// Drop every entry. Corpus files are never touched.
    async fn evict_all(&self) -> Result<()>;

    /// True when the store started from an unreadable cache and is
    /// treating every file as stale.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// An index hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub similarity: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert entries, replacing any with the same chunk ID. A replaced
    /// entry counts as newly inserted for tie ordering.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Up to `k` entries by descending cosine similarity; equal scores
    /// keep insertion order.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    /// Remove every entry from `source_path`; returns how many were removed.
    async fn delete_by_source(&self, source_path: &str) -> Result<usize>;

    /// Delete then upsert as one critical section. Returns the number of
    /// entries removed.
    async fn replace_source(&self, source_path: &str, entries: Vec<IndexEntry>) -> Result<usize>;

    /// Stored vectors for the given chunk IDs, where present.
    async fn cached_embeddings(&self, chunk_ids: &[String]) -> Result<HashMap<String, CachedEmbedding>>;

    /// Dimension of stored vectors, or `None` while empty.
    async fn dims(&self) -> Result<Option<usize>>;

    /// Distinct source paths with at least one entry.
    async fn sources(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;
}
