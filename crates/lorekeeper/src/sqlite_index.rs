//! SQLite-backed [`VectorIndex`].
//!
//! All rows live in the `index_entries` table, scoped by collection.
//! Vectors are stored as little-endian `f32` BLOBs and similarity is
//! computed brute-force in Rust, the same way the in-memory index does it.
//!
//! Per-file replacement runs in a single transaction, so readers see the
//! old set of chunks or the new one. Writers are serialised in-process so
//! no deferred transaction waits on the write lock with a stale snapshot.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;

use lorekeeper_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lorekeeper_core::models::{CachedEmbedding, IndexEntry};
use lorekeeper_core::progression::{Act, ProgressionTag};
use lorekeeper_core::store::{ScoredEntry, VectorIndex};
use lorekeeper_core::LoreError;

const SELECT_COLUMNS: &str = "seq, chunk_id, source_path, ordinal, text, section, act, arc, location, \
     branch, spoiler, foreshadowing, kind, characters_json, embedding, model, content_hash";

pub struct SqliteIndex {
    pool: SqlitePool,
    collection: String,
    writer: Mutex<()>,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn stored_dims<'e, E>(&self, executor: E) -> Result<Option<usize>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM index_entries WHERE collection = ? LIMIT 1")
                .bind(&self.collection)
                .fetch_optional(executor)
                .await?;
        Ok(dims.map(|d| d as usize))
    }

    async fn insert_all(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entries: &[IndexEntry],
    ) -> Result<()> {
        let mut expected = self.stored_dims(&mut **tx).await?;
        for entry in entries {
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

            sqlx::query("DELETE FROM index_entries WHERE collection = ? AND chunk_id = ?")
                .bind(&self.collection)
                .bind(&entry.chunk_id)
                .execute(&mut **tx)
                .await?;

            let tag = &entry.tag;
            sqlx::query(
                r#"
                INSERT INTO index_entries (
                    collection, chunk_id, source_path, ordinal, text, section,
                    act, arc, location, branch, spoiler, foreshadowing, kind,
                    characters_json, embedding, dims, model, content_hash
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.collection)
            .bind(&entry.chunk_id)
            .bind(&entry.source_path)
            .bind(entry.ordinal as i64)
            .bind(&entry.text)
            .bind(entry.section.as_deref())
            .bind(tag.act.map(|a| a.number() as i64))
            .bind(tag.arc.as_deref())
            .bind(tag.location.as_deref())
            .bind(tag.branch.as_deref())
            .bind(tag.spoiler)
            .bind(tag.foreshadowing)
            .bind(tag.kind.as_str())
            .bind(serde_json::to_string(&tag.characters)?)
            .bind(vec_to_blob(&entry.embedding))
            .bind(len as i64)
            .bind(&entry.model)
            .bind(&entry.content_hash)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn delete_source_in(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        source_path: &str,
    ) -> Result<usize> {
        let result =
            sqlx::query("DELETE FROM index_entries WHERE collection = ? AND source_path = ?")
                .bind(&self.collection)
                .bind(source_path)
                .execute(&mut **tx)
                .await?;
        Ok(result.rows_affected() as usize)
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<(i64, IndexEntry)> {
    let act: Option<i64> = row.try_get("act")?;
    let kind: String = row.try_get("kind")?;
    let characters_json: String = row.try_get("characters_json")?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    let ordinal: i64 = row.try_get("ordinal")?;

    let tag = ProgressionTag {
        act: act.and_then(|a| u32::try_from(a).ok()).map(Act),
        arc: row.try_get("arc")?,
        location: row.try_get("location")?,
        branch: row.try_get("branch")?,
        spoiler: row.try_get("spoiler")?,
        foreshadowing: row.try_get("foreshadowing")?,
        kind: kind.parse().unwrap_or_default(),
        characters: serde_json::from_str(&characters_json).unwrap_or_default(),
    };

    Ok((
        row.try_get("seq")?,
        IndexEntry {
            chunk_id: row.try_get("chunk_id")?,
            source_path: row.try_get("source_path")?,
            ordinal: ordinal as usize,
            text: row.try_get("text")?,
            section: row.try_get("section")?,
            tag,
            embedding: blob_to_vec(&blob),
            model: row.try_get("model")?,
            content_hash: row.try_get("content_hash")?,
        },
    ))
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        self.insert_all(&mut tx, &entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM index_entries WHERE collection = ? ORDER BY seq",
            SELECT_COLUMNS
        ))
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, i64, IndexEntry)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let (seq, entry) = row_to_entry(row)?;
            let sim = cosine_similarity(vector, &entry.embedding);
            scored.push((sim, seq, entry));
        }
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(similarity, _, entry)| ScoredEntry { entry, similarity })
            .collect())
    }

    async fn delete_by_source(&self, source_path: &str) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let removed = self.delete_source_in(&mut tx, source_path).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn replace_source(&self, source_path: &str, entries: Vec<IndexEntry>) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let removed = self.delete_source_in(&mut tx, source_path).await?;
        self.insert_all(&mut tx, &entries).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn cached_embeddings(&self, chunk_ids: &[String]) -> Result<HashMap<String, CachedEmbedding>> {
        let mut out = HashMap::new();
        for id in chunk_ids {
            let row = sqlx::query(
                "SELECT embedding, model, content_hash FROM index_entries WHERE collection = ? AND chunk_id = ?",
            )
            .bind(&self.collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                let blob: Vec<u8> = row.try_get("embedding")?;
                out.insert(
                    id.clone(),
                    CachedEmbedding {
                        model: row.try_get("model")?,
                        content_hash: row.try_get("content_hash")?,
                        embedding: blob_to_vec(&blob),
                    },
                );
            }
        }
        Ok(out)
    }

    async fn dims(&self) -> Result<Option<usize>> {
        self.stored_dims(&self.pool).await
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT source_path FROM index_entries WHERE collection = ? ORDER BY source_path",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        sqlx::query("DELETE FROM index_entries WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
