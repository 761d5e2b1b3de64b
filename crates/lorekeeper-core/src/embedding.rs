//! Embedding provider trait, vector utilities, and the embedding manager.
//!
//! The [`EmbeddingProvider`] trait is the only thing the core knows about
//! the embedding model. Concrete providers (hash, OpenAI, Ollama,
//! fastembed) live in the `lorekeeper` app crate.
//!
//! [`EmbeddingManager`] sits between the loader and the provider. It
//! reuses vectors already stored in the [`VectorIndex`] when the chunk is
//! unchanged, batches the rest, and isolates per-chunk failures.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LoreError;
use crate::models::Chunk;
use crate::store::VectorIndex;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use lorekeeper_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// A chunk that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedFailure {
    pub chunk_id: String,
    pub reason: String,
}

/// Result of [`EmbeddingManager::embed`].
#[derive(Debug, Default)]
pub struct EmbedOutcome {
    /// Chunk ID to vector, for every chunk that has one.
    pub vectors: HashMap<String, Vec<f32>>,
    /// Vectors taken from the index instead of the provider.
    pub reused: usize,
    /// Vectors produced by the provider during this call.
    pub computed: usize,
    pub failures: Vec<EmbedFailure>,
}

pub struct EmbeddingManager {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl EmbeddingManager {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            provider,
            index,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Fail fast when the provider's configured dimension cannot match the
    /// vectors already in the index.
    pub async fn check_dimensions(&self) -> Result<()> {
        let configured = self.provider.dims();
        match self.index.dims().await? {
            Some(stored) if configured > 0 && stored != configured => {
                Err(LoreError::DimensionMismatch {
                    expected: stored,
                    actual: configured,
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Produce a vector for every chunk, reusing stored ones where the
    /// chunk ID, model, and content hash all still match.
    ///
    /// Individual chunk failures are collected in the outcome. A vector of
    /// the wrong dimension is fatal and returned as
    /// [`LoreError::DimensionMismatch`].
    pub async fn embed(&self, chunks: &[Chunk]) -> Result<EmbedOutcome> {
        let mut outcome = EmbedOutcome::default();
        if chunks.is_empty() {
            return Ok(outcome);
        }

        let model = self.provider.model_name();
        let mut expected = match self.index.dims().await? {
            Some(d) => Some(d),
            None if self.provider.dims() > 0 => Some(self.provider.dims()),
            None => None,
        };

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let cached = self.index.cached_embeddings(&ids).await?;

        let mut pending: Vec<&Chunk> = Vec::new();
        for chunk in chunks {
            match cached.get(&chunk.id) {
                Some(hit)
                    if hit.model == model
                        && hit.content_hash == chunk.hash
                        && expected.map_or(true, |d| d == hit.embedding.len()) =>
                {
                    outcome
                        .vectors
                        .insert(chunk.id.clone(), hit.embedding.clone());
                    outcome.reused += 1;
                }
                _ => pending.push(chunk),
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let inputs: Vec<String> = batch.iter().map(|c| c.embedding_input()).collect();
            match self.provider.embed(&inputs).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        check_dims(&mut expected, &vector)?;
                        outcome.vectors.insert(chunk.id.clone(), vector);
                        outcome.computed += 1;
                    }
                }
                result => {
                    let reason = match result {
                        Ok(v) => format!("expected {} vectors, got {}", batch.len(), v.len()),
                        Err(e) => format!("{:#}", e),
                    };
                    warn!(batch = batch.len(), %reason, "embedding batch failed, retrying chunks individually");
                    for (chunk, input) in batch.iter().zip(inputs) {
                        match self.embed_one(input).await {
                            Ok(vector) => {
                                check_dims(&mut expected, &vector)?;
                                outcome.vectors.insert(chunk.id.clone(), vector);
                                outcome.computed += 1;
                            }
                            Err(e) => {
                                let reason = format!("{:#}", e);
                                warn!(chunk_id = %chunk.id, path = %chunk.source_path, %reason, "chunk embedding failed");
                                outcome.failures.push(EmbedFailure {
                                    chunk_id: chunk.id.clone(),
                                    reason,
                                });
                            }
                        }
                    }
                }
            }
        }

        debug!(
            reused = outcome.reused,
            computed = outcome.computed,
            failed = outcome.failures.len(),
            "embedded chunks"
        );
        Ok(outcome)
    }

    /// Embed a query string. Never cached.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text.to_string()).await
    }

    async fn embed_one(&self, input: String) -> Result<Vec<f32>> {
        let mut vectors = self.provider.embed(&[input]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() && !v.is_empty() => Ok(v),
            _ => anyhow::bail!("provider returned no vector"),
        }
    }
}

fn check_dims(expected: &mut Option<usize>, vector: &[f32]) -> Result<()> {
    match *expected {
        Some(d) if d != vector.len() => Err(LoreError::DimensionMismatch {
            expected: d,
            actual: vector.len(),
        }
        .into()),
        Some(_) => Ok(()),
        None => {
            *expected = Some(vector.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::models::IndexEntry;
    use crate::progression::ProgressionTag;
    use crate::store::memory::InMemoryIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Deterministic provider: vector = [len, vowels, 1]. Texts containing
    /// a poisoned word always fail; batches containing one fail too.
    struct Stub {
        calls: AtomicUsize,
        texts: Mutex<Vec<String>>,
        dims: usize,
    }

    impl Stub {
        fn new(dims: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts: Mutex::new(Vec::new()),
                dims,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for Stub {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().extend(texts.iter().cloned());
            if texts.iter().any(|t| t.contains("poison")) {
                anyhow::bail!("model refused input");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    let mut v = vec![t.len() as f32, vowels as f32, 1.0];
                    v.resize(self.dims, 0.5);
                    v
                })
                .collect())
        }
    }

    fn chunks(text: &str) -> Vec<Chunk> {
        chunk_document("a.md", "fp", text, &ProgressionTag::default(), 20, 0)
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_embed_computes_then_reuses() {
        let index = Arc::new(InMemoryIndex::new());
        let stub = Arc::new(Stub::new(3));
        let manager = EmbeddingManager::new(stub.clone(), index.clone(), 8);
        let cs = chunks("First passage.\n\nSecond passage here.");

        let first = manager.embed(&cs).await.unwrap();
        assert_eq!(first.computed, cs.len());
        assert_eq!(first.reused, 0);

        let entries = cs
            .iter()
            .map(|c| IndexEntry::from_chunk(c, first.vectors[&c.id].clone(), "stub"))
            .collect();
        index.upsert(entries).await.unwrap();

        let calls_before = stub.calls.load(Ordering::SeqCst);
        let second = manager.embed(&cs).await.unwrap();
        assert_eq!(second.reused, cs.len());
        assert_eq!(second.computed, 0);
        assert_eq!(stub.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_model_change_invalidates_reuse() {
        let index = Arc::new(InMemoryIndex::new());
        let cs = chunks("Only passage.");
        index
            .upsert(vec![IndexEntry::from_chunk(&cs[0], vec![1.0, 1.0, 1.0], "other-model")])
            .await
            .unwrap();
        let manager = EmbeddingManager::new(Arc::new(Stub::new(3)), index, 8);
        let out = manager.embed(&cs).await.unwrap();
        assert_eq!(out.reused, 0);
        assert_eq!(out.computed, 1);
    }

    #[tokio::test]
    async fn test_batch_failure_isolates_bad_chunk() {
        let index = Arc::new(InMemoryIndex::new());
        let stub = Arc::new(Stub::new(3));
        let manager = EmbeddingManager::new(stub.clone(), index, 8);
        let cs = chunks("Good words.\n\npoison pill.\n\nMore good.");
        assert_eq!(cs.len(), 3);

        let out = manager.embed(&cs).await.unwrap();
        assert_eq!(out.computed, 2);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].chunk_id, cs[1].id);
        assert!(out.failures[0].reason.contains("refused"));
        assert!(!out.vectors.contains_key(&cs[1].id));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let index = Arc::new(InMemoryIndex::new());
        let cs = chunks("Some passage.");
        index
            .upsert(vec![IndexEntry {
                chunk_id: "other".into(),
                source_path: "b.md".into(),
                ordinal: 0,
                text: "x".into(),
                section: None,
                tag: ProgressionTag::default(),
                embedding: vec![0.0; 5],
                model: "stub".into(),
                content_hash: "h".into(),
            }])
            .await
            .unwrap();
        let manager = EmbeddingManager::new(Arc::new(Stub::new(3)), index, 8);

        let err = manager.check_dimensions().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoreError>(),
            Some(LoreError::DimensionMismatch {
                expected: 5,
                actual: 3
            })
        ));
        let err = manager.embed(&cs).await.unwrap_err();
        assert!(err.downcast_ref::<LoreError>().is_some());
    }

    #[tokio::test]
    async fn test_embedding_input_carries_context_header() {
        let index = Arc::new(InMemoryIndex::new());
        let stub = Arc::new(Stub::new(3));
        let manager = EmbeddingManager::new(stub.clone(), index, 8);
        manager.embed(&chunks("Body.")).await.unwrap();
        let texts = stub.texts.lock().unwrap();
        assert_eq!(texts[0], "[General] a\n\nBody.");
    }

    #[tokio::test]
    async fn test_embed_query_is_never_cached() {
        let stub = Arc::new(Stub::new(3));
        let manager = EmbeddingManager::new(stub.clone(), Arc::new(InMemoryIndex::new()), 8);
        manager.embed_query("castle").await.unwrap();
        manager.embed_query("castle").await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }
}
