//! JSON-file [`CacheStore`].
//!
//! The whole cache is one JSON document:
//!
//! ```json
//! { "version": 1, "entries": { "Act I/village.md": { "fingerprint": "…", … } } }
//! ```
//!
//! Every mutation serialises the full map to a temporary file in the same
//! directory, fsyncs it, and renames it over the cache file. A crash at
//! any point leaves either the old file or the new one. The in-memory map
//! is updated only after the rename succeeds. The write runs on the
//! blocking pool.
//!
//! A cache file that cannot be read or parsed puts the store in degraded
//! mode: it starts empty, so every file is stale, and
//! [`CacheStore::is_degraded`] reports it until the next successful write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use lorekeeper_core::models::CacheEntry;
use lorekeeper_core::store::CacheStore;

const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

pub struct JsonCacheStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, CacheEntry>>,
    degraded: AtomicBool,
}

impl JsonCacheStore {
    /// Load the cache at `path`. A missing file is an empty cache.
    pub fn open(path: &Path) -> Result<Self> {
        let dir = parent_dir(path);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let (entries, degraded) = match std::fs::read(path) {
            Ok(bytes) => match decode(&bytes) {
                Ok(entries) => (entries, false),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(path = %path.display(), %reason, "cache file is corrupt, starting empty");
                    (BTreeMap::new(), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (BTreeMap::new(), false),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache file is unreadable, starting empty");
                (BTreeMap::new(), true)
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "opened cache");

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
            degraded: AtomicBool::new(degraded),
        })
    }

    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, CacheEntry>) + Send,
    {
        let mut guard = self.entries.lock().await;
        let mut next = guard.clone();
        f(&mut next);

        let path = self.path.clone();
        let doc = CacheFile {
            version: CACHE_VERSION,
            entries: next,
        };
        let doc = tokio::task::spawn_blocking(move || write_cache(&path, doc))
            .await
            .context("cache writer task failed")??;

        *guard = doc.entries;
        self.degraded.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Write `doc` to `path` via temp file and rename, handing the document back.
fn write_cache(path: &Path, doc: CacheFile) -> Result<CacheFile> {
    let json = serde_json::to_vec_pretty(&doc)?;

    let dir = parent_dir(path);
    let mut tmp = tempfile::Builder::new()
        .prefix(".cache-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(&json)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(doc)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn decode(bytes: &[u8]) -> Result<BTreeMap<String, CacheEntry>> {
    let doc: CacheFile = serde_json::from_slice(bytes).context("invalid cache JSON")?;
    if doc.version != CACHE_VERSION {
        anyhow::bail!("unsupported cache version {}", doc.version);
    }
    Ok(doc.entries)
}

#[async_trait]
impl CacheStore for JsonCacheStore {
    async fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.lock().await.get(path).cloned())
    }

    async fn commit(&self, entry: CacheEntry) -> Result<()> {
        self.mutate(move |m| {
            m.insert(entry.path.clone(), entry);
        })
        .await
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        if !self.entries.lock().await.contains_key(path) {
            return Ok(false);
        }
        let path = path.to_string();
        self.mutate(move |m| {
            m.remove(&path);
        })
        .await?;
        Ok(true)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.lock().await.values().cloned().collect())
    }

    async fn evict_all(&self) -> Result<()> {
        self.mutate(|m| m.clear()).await
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}
