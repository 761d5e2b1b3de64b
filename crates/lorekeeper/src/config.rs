//! Configuration parsing and validation.
//!
//! Lorekeeper is configured via a TOML file (default: `config/lore.toml`).
//! Missing optional sections fall back to defaults; [`load_config`]
//! validates values after parsing.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/lore.sqlite"
//!
//! [cache]
//! path = "./data/cache.json"
//!
//! [corpus]
//! root = "./campaign"
//! include_globs = ["**/*.md", "**/*.txt"]
//!
//! [chunking]
//! max_chars = 1000
//! overlap_chars = 200
//!
//! [embedding]
//! provider = "hash"
//! dims = 256
//!
//! [retrieval]
//! final_limit = 5
//! current_act_boost = 0.15
//! spoiler_penalty = 0.25
//! ```

use anyhow::{Context, Result};
use lorekeeper_core::retrieval::RetrievalWeights;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/cache.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for Ollama (default `http://localhost:11434`).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

pub const DEFAULT_HASH_DIMS: usize = 256;

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Model name recorded alongside stored vectors.
    pub fn model_name(&self) -> String {
        match (self.provider.as_str(), &self.model) {
            (_, Some(m)) => m.clone(),
            ("hash", None) => format!("hash-{}", self.effective_dims()),
            (p, None) => p.to_string(),
        }
    }

    pub fn effective_dims(&self) -> usize {
        match (self.provider.as_str(), self.dims) {
            (_, Some(d)) => d,
            ("hash", None) => DEFAULT_HASH_DIMS,
            _ => 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Rows are scoped to this collection so several campaigns can share
    /// one database.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
        }
    }
}

fn default_collection() -> String {
    "campaign".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    #[serde(flatten)]
    pub weights: RetrievalWeights,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            weights: RetrievalWeights::default(),
        }
    }
}

fn default_final_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if r.weights.overfetch_factor < 1 {
        anyhow::bail!("retrieval.overfetch_factor must be >= 1");
    }
    let w = &r.weights;
    for (name, value) in [
        ("current_act_boost", w.current_act_boost),
        ("current_arc_boost", w.current_arc_boost),
        ("location_boost", w.location_boost),
        ("character_boost", w.character_boost),
        ("lore_boost", w.lore_boost),
        ("branch_penalty", w.branch_penalty),
        ("spoiler_penalty", w.spoiler_penalty),
        ("foreshadow_penalty", w.foreshadow_penalty),
    ] {
        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("retrieval.{} must be a non-negative number", name);
        }
    }

    // Validate sync
    if config.sync.concurrency < 1 {
        anyhow::bail!("sync.concurrency must be >= 1");
    }

    // Validate index
    if config.index.collection.trim().is_empty() {
        anyhow::bail!("index.collection must not be empty");
    }

    // Validate embedding
    let e = &config.embedding;
    if e.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match e.provider.as_str() {
        "disabled" | "hash" => {}
        "openai" | "ollama" | "local" => {
            if e.dims.is_none() || e.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
            }
            if e.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }
    if e.provider == "hash" && e.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when provider is 'hash'");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/lore.sqlite"

[corpus]
root = "./campaign"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.final_limit, 5);
        assert_eq!(config.retrieval.weights, RetrievalWeights::default());
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.model_name(), "hash-256");
        assert_eq!(config.index.collection, "campaign");
        assert_eq!(config.sync.concurrency, 4);
        assert_eq!(config.corpus.include_globs, vec!["**/*.md", "**/*.txt"]);
    }

    #[test]
    fn test_retrieval_weights_are_flattened() {
        let toml = format!(
            "{}\n[retrieval]\nfinal_limit = 3\nspoiler_penalty = 0.5\noverfetch_factor = 4\n",
            MINIMAL
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.retrieval.final_limit, 3);
        assert_eq!(config.retrieval.weights.spoiler_penalty, 0.5);
        assert_eq!(config.retrieval.weights.overfetch_factor, 4);
        assert_eq!(config.retrieval.weights.current_act_boost, 0.15);
    }

    #[test]
    fn test_rejects_overlap_not_below_max() {
        let toml = format!("{}\n[chunking]\nmax_chars = 100\noverlap_chars = 100\n", MINIMAL);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let toml = format!("{}\n[retrieval]\nbranch_penalty = -1.0\n", MINIMAL);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("branch_penalty"));
    }

    #[test]
    fn test_network_provider_needs_model_and_dims() {
        let toml = format!("{}\n[embedding]\nprovider = \"openai\"\n", MINIMAL);
        assert!(parse_config(&toml).is_err());

        let toml = format!(
            "{}\n[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
            MINIMAL
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.embedding.model_name(), "nomic-embed-text");
        assert_eq!(config.embedding.effective_dims(), 768);
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../../../config/lore.example.toml")).unwrap();
        assert_eq!(config.corpus.exclude_globs, vec!["**/drafts/**"]);
        assert_eq!(config.embedding.model_name(), "hash-256");
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let toml = format!("{}\n[embedding]\nprovider = \"magic\"\n", MINIMAL);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }
}
