//! SQLite-backed [`Store`] implementation.
//!
//! Documents live in `index_documents` with vectors as BLOBs. Text is
//! mirrored into the `index_documents_fts` FTS5 table as space-separated
//! [`tokenize`] output, so CJK ideographs are individual FTS tokens and
//! queries tokenized the same way match them.
//!
//! FTS5 decides which documents match the lexical clause; their score is
//! the shared [`bm25_scores`] over the index's texts. FTS5's own `bm25()`
//! clamps IDF to 1e-6 for terms present in half the documents or more,
//! which would erase the lexical signal on small catalogues.
//!
//! Vector clauses are evaluated in Rust by brute-force cosine similarity
//! over every document of the index. Ties keep rowid order, and an upsert
//! updates the existing row in place so a re-indexed document keeps its
//! position.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

use hybrid_rag_core::embedding::{blob_to_vec, vec_to_blob};
use hybrid_rag_core::models::{Embedding, IndexDocument, Metadata};
use hybrid_rag_core::query::QuerySpec;
use hybrid_rag_core::schema::{ensure_schema, IndexSchema};
use hybrid_rag_core::store::lexical::{bm25_scores, tokenize};
use hybrid_rag_core::store::{BulkResponse, SearchHit, Store};

use crate::config::Config;
use crate::{db, migrate};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect, run migrations, and ensure the configured index exists
    /// with the configured schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        let store = Self::new(pool);
        ensure_schema(&store, &config.index.name, &config.schema()).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Ids of documents whose text matches any query term.
    async fn fts_matches(&self, index: &str, query: &str) -> Result<HashSet<String>> {
        let Some(fts_query) = fts_match_expr(query) else {
            return Ok(HashSet::new());
        };

        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT doc_id
            FROM index_documents_fts
            WHERE index_documents_fts MATCH ? AND index_name = ?
            "#,
        )
        .bind(&fts_query)
        .bind(index)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// BM25 scores keyed by position in `docs`, for FTS matches only.
    async fn lexical_scores(
        &self,
        index: &str,
        query: &str,
        docs: &[IndexDocument],
    ) -> Result<HashMap<usize, f64>> {
        let matched = self.fts_matches(index, query).await?;
        if matched.is_empty() {
            return Ok(HashMap::new());
        }
        let texts: Vec<Option<&str>> = docs.iter().map(|d| d.text.as_deref()).collect();
        Ok(bm25_scores(&texts, query)
            .into_iter()
            .filter(|(pos, _)| matched.contains(&docs[*pos].doc_id))
            .collect())
    }

    async fn require_index(&self, index: &str) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM indices WHERE name = ?")
            .bind(index)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(anyhow!("index '{}' not found", index));
        }
        Ok(())
    }
}

/// OR of quoted terms, like a default `match` query. `None` if the query
/// has no indexable terms.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = tokenize(query)
        .into_iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Text as stored in the FTS table: [`tokenize`] output joined by spaces.
fn fts_text(text: &str) -> String {
    tokenize(text).join(" ")
}

fn row_to_document(row: &SqliteRow) -> Result<IndexDocument> {
    let text_vector: Option<Vec<u8>> = row.get("text_vector");
    let image_vector: Option<Vec<u8>> = row.get("image_vector");
    let metadata_json: String = row.get("metadata_json");
    let doc_id: String = row.get("doc_id");
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .with_context(|| format!("Corrupt metadata for document {}", doc_id))?;

    Ok(IndexDocument {
        doc_id,
        text: row.get("text"),
        text_vector: text_vector.map(|b| Embedding::from_stored(blob_to_vec(&b))),
        image_vector: image_vector.map(|b| Embedding::from_stored(blob_to_vec(&b))),
        metadata,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>> {
        let json: Option<String> = sqlx::query_scalar("SELECT schema_json FROM indices WHERE name = ?")
            .bind(index)
            .fetch_optional(&self.pool)
            .await?;

        json.map(|j| {
            serde_json::from_str(&j).with_context(|| format!("Corrupt schema for index {}", index))
        })
        .transpose()
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        let schema_json = serde_json::to_string(schema)?;
        sqlx::query("INSERT INTO indices (name, schema_json, created_at) VALUES (?, ?, ?)")
            .bind(index)
            .bind(&schema_json)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create index {}", index))?;
        Ok(())
    }

    async fn bulk_write(&self, index: &str, docs: &[IndexDocument]) -> Result<BulkResponse> {
        self.require_index(index).await?;

        let now = chrono::Utc::now().timestamp();
        let mut response = BulkResponse::default();
        let mut tx = self.pool.begin().await?;

        for doc in docs {
            let metadata_json = match serde_json::to_string(&doc.metadata) {
                Ok(j) => j,
                Err(e) => {
                    tracing::warn!(doc_id = %doc.doc_id, error = %e, "metadata not serializable");
                    response.failed.push(doc.doc_id.clone());
                    continue;
                }
            };

            let written = sqlx::query(
                r#"
                INSERT INTO index_documents (index_name, doc_id, text, text_vector,
                                             image_vector, metadata_json, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(index_name, doc_id) DO UPDATE SET
                    text = excluded.text,
                    text_vector = excluded.text_vector,
                    image_vector = excluded.image_vector,
                    metadata_json = excluded.metadata_json,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(index)
            .bind(&doc.doc_id)
            .bind(&doc.text)
            .bind(doc.text_vector.as_ref().map(|v| vec_to_blob(v.as_slice())))
            .bind(doc.image_vector.as_ref().map(|v| vec_to_blob(v.as_slice())))
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await;

            if let Err(e) = written {
                tracing::warn!(doc_id = %doc.doc_id, error = %e, "document write rejected");
                response.failed.push(doc.doc_id.clone());
                continue;
            }

            sqlx::query("DELETE FROM index_documents_fts WHERE index_name = ? AND doc_id = ?")
                .bind(index)
                .bind(&doc.doc_id)
                .execute(&mut *tx)
                .await?;

            if let Some(text) = &doc.text {
                sqlx::query(
                    "INSERT INTO index_documents_fts (index_name, doc_id, text) VALUES (?, ?, ?)",
                )
                .bind(index)
                .bind(&doc.doc_id)
                .bind(fts_text(text))
                .execute(&mut *tx)
                .await?;
            }

            response.succeeded.push(doc.doc_id.clone());
        }

        tx.commit().await?;
        Ok(response)
    }

    async fn search(&self, spec: &QuerySpec) -> Result<Vec<SearchHit>> {
        self.require_index(spec.index()).await?;

        let rows = sqlx::query(
            r#"
            SELECT doc_id, text, text_vector, image_vector, metadata_json
            FROM index_documents
            WHERE index_name = ?
            ORDER BY rowid
            "#,
        )
        .bind(spec.index())
        .fetch_all(&self.pool)
        .await?;
        let docs = rows.iter().map(row_to_document).collect::<Result<Vec<_>>>()?;

        let lexical = match spec.lexical_query() {
            Some(q) => self.lexical_scores(spec.index(), q, &docs).await?,
            None => HashMap::new(),
        };

        let mut hits = Vec::new();
        for (pos, doc) in docs.into_iter().enumerate() {
            let lex = lexical.get(&pos).copied();
            let vec = spec.vector_score(&doc);
            if lex.is_none() && vec.is_none() {
                continue;
            }
            hits.push(SearchHit {
                doc_id: doc.doc_id.clone(),
                score: lex.unwrap_or(0.0) + vec.unwrap_or(0.0),
                document: doc,
            });
        }

        // Stable sort: equal scores keep rowid order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(spec.size());
        Ok(hits)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_documents WHERE index_name = ?")
            .bind(index)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn get(&self, index: &str, doc_id: &str) -> Result<Option<IndexDocument>> {
        let row = sqlx::query(
            r#"
            SELECT doc_id, text, text_vector, image_vector, metadata_json
            FROM index_documents
            WHERE index_name = ? AND doc_id = ?
            "#,
        )
        .bind(index)
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_document).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_rag_core::embedding::{EncoderAdapter, ImageEncoder, TextEncoder};
    use hybrid_rag_core::query::HybridQueryBuilder;
    use std::path::Path;
    use tempfile::TempDir;

    /// "jacket" texts point one way, everything else the other.
    struct Axis;

    impl TextEncoder for Axis {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(if text.contains("jacket") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }
    }

    impl ImageEncoder for Axis {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_image(&self, _path: &Path) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn open_store(tmp: &TempDir) -> (Config, SqliteStore) {
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("data/test.sqlite");
        config.embedding.text_dims = 2;
        config.embedding.image_dims = 2;
        let store = SqliteStore::open(&config).await.unwrap();
        (config, store)
    }

    fn chunk(id: &str, text: &str) -> IndexDocument {
        let vector = Axis.embed_text(text).unwrap();
        IndexDocument::text_chunk(id, text, Embedding::normalized(vector), Metadata::new())
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        store.pool().close().await;

        let (_, store) = open_store(&tmp).await;
        let schema = store.index_schema(&config.index.name).await.unwrap();
        assert_eq!(schema, Some(config.schema()));
    }

    #[tokio::test]
    async fn test_write_get_and_upsert() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        let index = config.index.name.as_str();

        let resp = store
            .bulk_write(
                index,
                &[
                    chunk("a-chunk-0", "long down jacket"),
                    chunk("b-chunk-0", "cotton socks"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(resp.succeeded.len(), 2);
        assert!(resp.failed.is_empty());
        assert_eq!(store.count(index).await.unwrap(), 2);

        let doc = store.get(index, "a-chunk-0").await.unwrap().unwrap();
        assert_eq!(doc.text.as_deref(), Some("long down jacket"));
        assert_eq!(doc.text_vector.unwrap().into_inner(), vec![1.0, 0.0]);

        store
            .bulk_write(index, &[chunk("a-chunk-0", "short jacket")])
            .await
            .unwrap();
        assert_eq!(store.count(index).await.unwrap(), 2);
        let doc = store.get(index, "a-chunk-0").await.unwrap().unwrap();
        assert_eq!(doc.text.as_deref(), Some("short jacket"));
    }

    #[tokio::test]
    async fn test_hybrid_search_ranks_lexical_and_vector_match_first() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        let index = config.index.name.as_str();
        store
            .bulk_write(
                index,
                &[
                    chunk("socks-chunk-0", "cotton socks"),
                    chunk("coat-chunk-0", "long down jacket"),
                ],
            )
            .await
            .unwrap();

        let schema = config.schema();
        let adapter = EncoderAdapter::new(&Axis, &Axis);
        let builder = HybridQueryBuilder::new(&adapter, &schema, index);
        let spec = builder.build_query("jacket", None, 10).unwrap();

        let hits = store.search(&spec).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "coat-chunk-0");
        assert!(hits[0].score > hits[1].score);

        let spec = builder.build_query("jacket", None, 1).unwrap();
        assert_eq!(store.search(&spec).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cjk_query_matches_lexically() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        let index = config.index.name.as_str();
        store
            .bulk_write(
                index,
                &[
                    chunk("a-chunk-0", "商品A：长款羽绒服，白鸭绒填充"),
                    chunk("b-chunk-0", "cotton socks"),
                ],
            )
            .await
            .unwrap();

        let matched = store.fts_matches(index, "羽绒服").await.unwrap();
        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec!["a-chunk-0"]);

        // Both documents share the query's text vector, so the lexical
        // clause alone separates them.
        let schema = config.schema();
        let adapter = EncoderAdapter::new(&Axis, &Axis);
        let builder = HybridQueryBuilder::new(&adapter, &schema, index);
        let spec = builder.build_query("羽绒服", None, 10).unwrap();
        let hits = store.search(&spec).await.unwrap();
        assert_eq!(hits[0].doc_id, "a-chunk-0");
        assert!(hits[0].score > hits[1].score + 0.1);
    }

    #[tokio::test]
    async fn test_term_in_every_document_keeps_lexical_weight() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        let index = config.index.name.as_str();
        store
            .bulk_write(
                index,
                &[
                    chunk("long-chunk-0", "long down jacket"),
                    chunk("short-chunk-0", "short jacket"),
                ],
            )
            .await
            .unwrap();

        let schema = config.schema();
        let adapter = EncoderAdapter::new(&Axis, &Axis);
        let builder = HybridQueryBuilder::new(&adapter, &schema, index);
        let spec = builder.build_query("jacket", None, 10).unwrap();
        let hits = store.search(&spec).await.unwrap();

        // Vector contribution is 2.0 for both; BM25 adds a visible amount.
        assert!(hits.iter().all(|h| h.score > 2.1));
        assert_eq!(hits[0].doc_id, "short-chunk-0");
    }

    #[tokio::test]
    async fn test_ties_keep_rowid_order_across_upsert() {
        let tmp = TempDir::new().unwrap();
        let (config, store) = open_store(&tmp).await;
        let index = config.index.name.as_str();
        store
            .bulk_write(
                index,
                &[
                    chunk("c", "cotton socks"),
                    chunk("a", "wool socks"),
                    chunk("b", "silk socks"),
                ],
            )
            .await
            .unwrap();

        let schema = config.schema();
        let adapter = EncoderAdapter::new(&Axis, &Axis);
        let builder = HybridQueryBuilder::new(&adapter, &schema, index);
        // No lexical match, identical vectors: every score is 2.0.
        let spec = builder.build_query("zzz", None, 10).unwrap();
        let order = |hits: Vec<SearchHit>| hits.into_iter().map(|h| h.doc_id).collect::<Vec<_>>();

        let hits = store.search(&spec).await.unwrap();
        assert!(hits.iter().all(|h| h.score == hits[0].score));
        assert_eq!(order(hits), vec!["c", "a", "b"]);

        store
            .bulk_write(index, &[chunk("c", "thick cotton socks")])
            .await
            .unwrap();
        assert_eq!(order(store.search(&spec).await.unwrap()), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_write_to_missing_index_fails() {
        let tmp = TempDir::new().unwrap();
        let (_, store) = open_store(&tmp).await;
        assert!(store.bulk_write("nope", &[chunk("x", "y")]).await.is_err());
    }

    #[test]
    fn test_fts_text_splits_ideographs() {
        assert_eq!(fts_text("长款羽绒服, Down"), "长 款 羽 绒 服 down");
    }

    #[test]
    fn test_fts_match_expr() {
        assert_eq!(
            fts_match_expr("Down jacket?").as_deref(),
            Some("\"down\" OR \"jacket\"")
        );
        assert_eq!(fts_match_expr("?!"), None);
    }
}
