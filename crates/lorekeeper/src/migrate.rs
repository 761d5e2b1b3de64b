use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index schema. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // `seq` gives every write a fresh position for tie ordering.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_entries (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            chunk_id TEXT NOT NULL,
            source_path TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            section TEXT,
            act INTEGER,
            arc TEXT,
            location TEXT,
            branch TEXT,
            spoiler INTEGER NOT NULL DEFAULT 0,
            foreshadowing INTEGER NOT NULL DEFAULT 0,
            kind TEXT NOT NULL DEFAULT 'reference',
            characters_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            model TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            UNIQUE(collection, chunk_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_entries_source ON index_entries(collection, source_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
