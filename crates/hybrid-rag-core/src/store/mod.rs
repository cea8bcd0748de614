//! Document store abstraction.
//!
//! The [`Store`] trait is the pipeline's only view of the document store:
//! schema lookup and creation, bulk writes, and execution of a fused
//! [`QuerySpec`]. Implementations must be `Send + Sync` so several batch
//! indexers can flush into one store concurrently.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`index_schema`](Store::index_schema) | Look up an index's schema |
//! | [`create_index`](Store::create_index) | Create an index with a schema |
//! | [`bulk_write`](Store::bulk_write) | Upsert documents by `doc_id` |
//! | [`search`](Store::search) | Execute a hybrid query |
//! | [`count`](Store::count) | Number of documents in an index |
//! | [`get`](Store::get) | Fetch one document by id |

pub mod lexical;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::IndexDocument;
use crate::query::QuerySpec;
use crate::schema::IndexSchema;

/// Outcome of a bulk write.
///
/// A store reports per-document rejections here instead of failing the
/// whole call; transport failures are returned as `Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BulkResponse {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    /// Combined score: sum of every matching clause's contribution.
    pub score: f64,
    pub document: IndexDocument,
}

/// Abstract document store.
///
/// Writes are upserts keyed by `doc_id`: writing an existing id replaces
/// the document in place. `search` must return hits ordered by
/// descending score, ties in the store's native insertion order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Schema of `index`, or `None` if it does not exist.
    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>>;

    /// Create `index` with `schema`.
    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()>;

    /// Upsert documents into `index`.
    async fn bulk_write(&self, index: &str, docs: &[IndexDocument]) -> Result<BulkResponse>;

    /// Execute a hybrid query.
    async fn search(&self, spec: &QuerySpec) -> Result<Vec<SearchHit>>;

    /// Number of documents in `index`.
    async fn count(&self, index: &str) -> Result<usize>;

    /// Fetch a document by id.
    async fn get(&self, index: &str, doc_id: &str) -> Result<Option<IndexDocument>>;
}
