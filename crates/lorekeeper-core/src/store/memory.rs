//! In-memory [`CacheStore`] and [`VectorIndex`] implementations.
//!
//! Both sit behind `std::sync::RwLock`. Vector search is brute-force
//! cosine similarity over every stored vector.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::LoreError;
use crate::models::{CacheEntry, CachedEmbedding, IndexEntry};

use super::{CacheStore, ScoredEntry, VectorIndex};

/// Cache store that forgets everything on drop.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<BTreeMap<String, CacheEntry>>,
    commits: AtomicUsize,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful [`CacheStore::commit`] calls.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, CacheEntry>>> {
        self.entries.read().map_err(|_| LoreError::Poisoned("cache").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, CacheEntry>>> {
        self.entries.write().map_err(|_| LoreError::Poisoned("cache").into())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        Ok(self.read()?.get(path).cloned())
    }

    async fn commit(&self, entry: CacheEntry) -> Result<()> {
        self.write()?.insert(entry.path.clone(), entry);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        Ok(self.write()?.remove(path).is_some())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn evict_all(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}

struct Stored {
    seq: u64,
    entry: IndexEntry,
}

#[derive(Default)]
struct IndexState {
    rows: Vec<Stored>,
    next_seq: u64,
}

impl IndexState {
    fn dims(&self) -> Option<usize> {
        self.rows.first().map(|r| r.entry.embedding.len())
    }

    fn upsert(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut expected = self.dims();
        for entry in &entries {
            let len = entry.embedding.len();
            match expected {
                Some(d) if d != len => {
                    return Err(LoreError::DimensionMismatch {
                        expected: d,
                        actual: len,
                    }
                    .into())
                }
                _ => expected = Some(len),
            }
        }
        for entry in entries {
            self.rows.retain(|r| r.entry.chunk_id != entry.chunk_id);
            self.rows.push(Stored {
                seq: self.next_seq,
                entry,
            });
            self.next_seq += 1;
        }
        Ok(())
    }

    fn delete_by_source(&mut self, source_path: &str) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| r.entry.source_path != source_path);
        before - self.rows.len()
    }
}

/// Vector index held entirely in memory.
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
    mutations: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls that changed (or attempted to change) the index.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, IndexState>> {
        self.state.read().map_err(|_| LoreError::Poisoned("index").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, IndexState>> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.state.write().map_err(|_| LoreError::Poisoned("index").into())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.write()?.upsert(entries)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let state = self.read()?;
        let mut scored: Vec<(f32, u64, &IndexEntry)> = state
            .rows
            .iter()
            .map(|r| (cosine_similarity(vector, &r.entry.embedding), r.seq, &r.entry))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(similarity, _, entry)| ScoredEntry {
                entry: entry.clone(),
                similarity,
            })
            .collect())
    }

    async fn delete_by_source(&self, source_path: &str) -> Result<usize> {
        Ok(self.write()?.delete_by_source(source_path))
    }

    async fn replace_source(&self, source_path: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let mut state = self.write()?;
        let removed_rows: Vec<Stored> = {
            let (gone, kept): (Vec<Stored>, Vec<Stored>) = std::mem::take(&mut state.rows)
                .into_iter()
                .partition(|r| r.entry.source_path == source_path);
            state.rows = kept;
            gone
        };
        let removed = removed_rows.len();
        if let Err(e) = state.upsert(entries) {
            // Restore the previous rows so a failed replace changes nothing.
            state.rows.extend(removed_rows);
            state.rows.sort_by_key(|r| r.seq);
            return Err(e);
        }
        Ok(removed)
    }

    async fn cached_embeddings(&self, chunk_ids: &[String]) -> Result<HashMap<String, CachedEmbedding>> {
        let wanted: BTreeSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        let state = self.read()?;
        Ok(state
            .rows
            .iter()
            .filter(|r| wanted.contains(r.entry.chunk_id.as_str()))
            .map(|r| {
                (
                    r.entry.chunk_id.clone(),
                    CachedEmbedding {
                        model: r.entry.model.clone(),
                        content_hash: r.entry.content_hash.clone(),
                        embedding: r.entry.embedding.clone(),
                    },
                )
            })
            .collect())
    }

    async fn dims(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dims())
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let state = self.read()?;
        let set: BTreeSet<&str> = state.rows.iter().map(|r| r.entry.source_path.as_str()).collect();
        Ok(set.into_iter().map(str::to_string).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.rows.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.write()?;
        state.rows.clear();
        Ok(())
    }
}
