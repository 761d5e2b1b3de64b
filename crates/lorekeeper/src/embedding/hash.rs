//! Feature-hashing embedder.
//!
//! Each lowercase word is hashed with SHA-256; the first eight digest bytes
//! pick a bucket and the ninth picks a sign. The summed vector is
//! L2-normalised, so cosine similarity tracks shared vocabulary. Useful
//! offline and in tests, not a substitute for a real model.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use lorekeeper_core::embedding::EmbeddingProvider;

pub struct HashProvider {
    model: String,
    dims: usize,
}

impl HashProvider {
    pub fn new(model: String, dims: usize) -> Self {
        Self {
            model,
            dims: dims.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
