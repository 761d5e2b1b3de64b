//! Data types shared by every component.
//!
//! | Type | Produced by | Consumed by |
//! |------|-------------|-------------|
//! | [`FileRecord`] | loader | cache store |
//! | [`CacheEntry`] | loader | cache store |
//! | [`Chunk`] | chunker | embedding manager, loader |
//! | [`IndexEntry`] | loader | vector index, retriever |
//! | [`RetrievalResult`] | retriever | caller |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::intent::QueryIntent;
use crate::progression::ProgressionTag;

/// Lower-hex SHA-256 of a byte slice.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Identity and content fingerprint of one corpus file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Corpus-relative, `/`-separated.
    pub path: String,
    pub fingerprint: String,
    /// Unix seconds.
    pub modified: i64,
    pub size: u64,
}

impl FileRecord {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8], modified: i64) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint(bytes),
            modified,
            size: bytes.len() as u64,
        }
    }
}

/// What the cache remembers about the last successful processing of a file.
///
/// Entries are replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub path: String,
    pub fingerprint: String,
    pub chunk_ids: Vec<String>,
    /// Model whose vectors were stored for these chunks.
    pub embedding_model: String,
    pub size: u64,
    pub modified: i64,
    pub committed_at: i64,
}

/// A bounded span of source text, the atomic retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_path: String,
    pub ordinal: usize,
    pub text: String,
    /// Byte offset of `text` within the source document.
    pub start: usize,
    pub end: usize,
    /// Nearest preceding Markdown heading.
    pub section: Option<String>,
    /// SHA-256 of [`Chunk::embedding_input`].
    pub hash: String,
    pub tag: ProgressionTag,
}

impl Chunk {
    /// The text handed to the embedding model: a short context header
    /// (`[Act II] castle`) followed by the chunk text.
    pub fn embedding_input(&self) -> String {
        embedding_input(&self.tag, &self.source_path, &self.text)
    }
}

pub(crate) fn embedding_input(tag: &ProgressionTag, source_path: &str, text: &str) -> String {
    let stem = source_path
        .rsplit('/')
        .next()
        .map(|name| name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name))
        .unwrap_or(source_path);
    format!("[{}] {}\n\n{}", tag.label(), stem, text)
}

/// A stored chunk with its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub source_path: String,
    pub ordinal: usize,
    pub text: String,
    pub section: Option<String>,
    pub tag: ProgressionTag,
    pub embedding: Vec<f32>,
    pub model: String,
    pub content_hash: String,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>, model: &str) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            source_path: chunk.source_path.clone(),
            ordinal: chunk.ordinal,
            text: chunk.text.clone(),
            section: chunk.section.clone(),
            tag: chunk.tag.clone(),
            embedding,
            model: model.to_string(),
            content_hash: chunk.hash.clone(),
        }
    }
}

/// A vector previously stored for a chunk, as returned by
/// [`VectorIndex::cached_embeddings`](crate::store::VectorIndex::cached_embeddings).
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmbedding {
    pub model: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// One ranked passage returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub chunk_id: String,
    pub source_path: String,
    pub section: Option<String>,
    pub text: String,
    /// Adjusted score after boosts and penalties.
    pub score: f32,
    /// Raw cosine similarity from the index.
    pub similarity: f32,
    pub tag: ProgressionTag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalStatus {
    /// Filtered and re-ranked against a progression state.
    Ranked,
    /// No progression state was supplied; nothing was filtered.
    Unfiltered,
    /// The query could not be embedded; no passages.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub passages: Vec<Passage>,
    pub intent: QueryIntent,
    #[serde(flatten)]
    pub status: RetrievalStatus,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::Act;

    #[test]
    fn test_fingerprint_is_content_only() {
        let a = FileRecord::from_bytes("a.md", b"same", 1);
        let b = FileRecord::from_bytes("b.md", b"same", 99);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
        assert_ne!(a.fingerprint, fingerprint(b"other"));
    }

    #[test]
    fn test_embedding_input_header() {
        let tag = ProgressionTag {
            act: Some(Act(2)),
            ..Default::default()
        };
        assert_eq!(
            embedding_input(&tag, "Act II/castle.md", "The gates open."),
            "[Act II] castle\n\nThe gates open."
        );
        assert_eq!(
            embedding_input(&ProgressionTag::default(), "bestiary", "Wolves."),
            "[General] bestiary\n\nWolves."
        );
    }
}
