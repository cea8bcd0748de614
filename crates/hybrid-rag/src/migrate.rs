use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index tables if they do not exist.
///
/// - `indices`: one row per index with its schema as JSON.
/// - `index_documents`: documents keyed by `(index_name, doc_id)`, vectors
///   stored as little-endian f32 BLOBs, metadata as JSON.
/// - `index_documents_fts`: FTS5 table over document text for BM25.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indices (
            name TEXT PRIMARY KEY,
            schema_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_documents (
            index_name TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            text TEXT,
            text_vector BLOB,
            image_vector BLOB,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (index_name, doc_id),
            FOREIGN KEY (index_name) REFERENCES indices(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE index_documents_fts USING fts5(
                index_name UNINDEXED,
                doc_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_documents_index ON index_documents(index_name)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
