//! Concrete embedding providers.
//!
//! Every provider implements the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]** fails every call; sync still tags and chunks
//!   but nothing is indexed.
//! - **[`HashProvider`]** deterministic feature hashing; offline, no model.
//! - **[`OpenAIProvider`]** `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaProvider`]** `POST /api/embed` on a local Ollama instance.
//! - **`LocalProvider`** fastembed, behind the `local-embeddings` feature.
//!
//! # Retry Strategy
//!
//! The HTTP providers retry 429, 5xx and network errors with exponential
//! backoff (1s, 2s, 4s, ... capped at 32s). Other 4xx responses fail at
//! once.

mod hash;
#[cfg(feature = "local-embeddings")]
mod local;
mod remote;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use lorekeeper_core::embedding::EmbeddingProvider;

use crate::config::EmbeddingConfig;

pub use hash::HashProvider;
#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;
pub use remote::{OllamaProvider, OpenAIProvider};

/// Used when `embedding.provider = "disabled"`.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

/// Build the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"hash"` | [`HashProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `--features local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "hash" => Ok(Arc::new(HashProvider::new(
            config.model_name(),
            config.effective_dims(),
        ))),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
