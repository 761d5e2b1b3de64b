//! The application handle.
//!
//! [`Lorekeeper`] owns everything a command needs: the SQLite pool, the
//! JSON cache store, the vector index, the embedding provider, and the
//! core loader and retriever wired on top of them. Build it with
//! [`Lorekeeper::open`] and release the pool with [`Lorekeeper::close`].

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use lorekeeper_core::embedding::EmbeddingManager;
use lorekeeper_core::loader::{ContentLoader, LoaderOptions, SyncReport};
use lorekeeper_core::models::RetrievalResult;
use lorekeeper_core::progression::ProgressionState;
use lorekeeper_core::retrieval::Retriever;
use lorekeeper_core::store::{CacheStore, VectorIndex};

use crate::cache_file::JsonCacheStore;
use crate::config::Config;
use crate::connector_fs::FsCorpus;
use crate::db;
use crate::embedding::create_provider;
use crate::migrate;
use crate::sqlite_index::SqliteIndex;

/// Counts reported by `lore stats`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub collection: String,
    pub entries: usize,
    pub sources: usize,
    pub dims: Option<usize>,
    pub cached_files: usize,
    /// Most recent cache commit, Unix seconds.
    pub last_commit: Option<i64>,
    pub cache_degraded: bool,
    pub model: String,
}

pub struct Lorekeeper {
    config: Config,
    pool: SqlitePool,
    cache: Arc<JsonCacheStore>,
    index: Arc<SqliteIndex>,
    loader: ContentLoader,
    retriever: Retriever,
    model: String,
}

impl Lorekeeper {
    /// Connect the database, create the schema if needed, load the cache,
    /// and build the provider named in the config.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;

        let cache = Arc::new(JsonCacheStore::open(&config.cache.path)?);
        let index = Arc::new(SqliteIndex::new(
            pool.clone(),
            config.index.collection.clone(),
        ));
        let provider = create_provider(&config.embedding)?;
        let model = provider.model_name().to_string();

        let embeddings = Arc::new(EmbeddingManager::new(
            provider,
            index.clone() as Arc<dyn VectorIndex>,
            config.embedding.batch_size,
        ));
        let loader = ContentLoader::new(
            cache.clone() as Arc<dyn CacheStore>,
            index.clone() as Arc<dyn VectorIndex>,
            embeddings.clone(),
            LoaderOptions {
                max_chars: config.chunking.max_chars,
                overlap_chars: config.chunking.overlap_chars,
                concurrency: config.sync.concurrency,
            },
        );
        let retriever = Retriever::new(
            embeddings,
            index.clone() as Arc<dyn VectorIndex>,
            config.retrieval.weights.clone(),
        );

        info!(
            db = %config.db.path.display(),
            collection = %config.index.collection,
            model = %model,
            "opened"
        );

        Ok(Self {
            config: config.clone(),
            pool,
            cache,
            index,
            loader,
            retriever,
            model,
        })
    }

    /// Sync the configured corpus. `full` evicts the cache first.
    pub async fn sync(&self, full: bool) -> Result<SyncReport> {
        let corpus = FsCorpus::new(&self.config.corpus)?;
        if full {
            self.loader.sync_full(&corpus).await
        } else {
            self.loader.sync(&corpus).await
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        state: Option<&ProgressionState>,
        k: usize,
    ) -> Result<RetrievalResult> {
        self.retriever.retrieve(query, state, k).await
    }

    /// Forget every cached file and every indexed chunk in the collection.
    pub async fn reset(&self) -> Result<usize> {
        let removed = self.index.count().await?;
        self.index.clear().await?;
        self.cache.evict_all().await?;
        info!(removed, "reset collection");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let cached = self.cache.entries().await?;
        Ok(IndexStats {
            collection: self.index.collection().to_string(),
            entries: self.index.count().await?,
            sources: self.index.sources().await?.len(),
            dims: self.index.dims().await?,
            cached_files: cached.len(),
            last_commit: cached.iter().map(|e| e.committed_at).max(),
            cache_degraded: self.cache.is_degraded(),
            model: self.model.clone(),
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
