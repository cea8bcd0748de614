//! In-memory [`Store`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Lexical scoring is Okapi BM25 from [`super::lexical`]; vector
//! clauses are brute-force cosine similarity over every document. Ties
//! keep insertion order (an upsert keeps the document's original slot).
//!
//! Two test hooks are provided: [`InMemoryStore::reject_ids`] makes
//! `bulk_write` report chosen ids as failed, and
//! [`InMemoryStore::write_batches`] records the size of every bulk write.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::IndexDocument;
use crate::query::{Clause, QuerySpec};
use crate::schema::IndexSchema;

use super::lexical::bm25_scores;
use super::{BulkResponse, SearchHit, Store};

struct StoredIndex {
    schema: IndexSchema,
    docs: Vec<IndexDocument>,
    slots: HashMap<String, usize>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, StoredIndex>>,
    rejected: RwLock<HashSet<String>>,
    batches: RwLock<Vec<usize>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            rejected: RwLock::new(HashSet::new()),
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Make subsequent bulk writes reject these document ids.
    pub fn reject_ids<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rejected = write(&self.rejected)?;
        rejected.clear();
        rejected.extend(ids.into_iter().map(Into::into));
        Ok(())
    }

    /// Sizes of every `bulk_write` call so far, in call order.
    pub fn write_batches(&self) -> Result<Vec<usize>> {
        Ok(read(&self.batches)?.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn index_schema(&self, index: &str) -> Result<Option<IndexSchema>> {
        Ok(read(&self.indices)?.get(index).map(|i| i.schema.clone()))
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<()> {
        let mut indices = write(&self.indices)?;
        if indices.contains_key(index) {
            bail!("index '{}' already exists", index);
        }
        indices.insert(
            index.to_string(),
            StoredIndex {
                schema: schema.clone(),
                docs: Vec::new(),
                slots: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn bulk_write(&self, index: &str, docs: &[IndexDocument]) -> Result<BulkResponse> {
        write(&self.batches)?.push(docs.len());
        let rejected = read(&self.rejected)?;
        let mut indices = write(&self.indices)?;
        let stored = indices
            .get_mut(index)
            .ok_or_else(|| anyhow!("index '{}' not found", index))?;

        let mut response = BulkResponse::default();
        for doc in docs {
            if rejected.contains(&doc.doc_id) {
                response.failed.push(doc.doc_id.clone());
                continue;
            }
            match stored.slots.get(&doc.doc_id) {
                Some(&slot) => stored.docs[slot] = doc.clone(),
                None => {
                    stored.slots.insert(doc.doc_id.clone(), stored.docs.len());
                    stored.docs.push(doc.clone());
                }
            }
            response.succeeded.push(doc.doc_id.clone());
        }
        Ok(response)
    }

    async fn search(&self, spec: &QuerySpec) -> Result<Vec<SearchHit>> {
        let indices = read(&self.indices)?;
        let stored = indices
            .get(spec.index())
            .ok_or_else(|| anyhow!("index '{}' not found", spec.index()))?;

        let lexical = spec
            .clauses()
            .iter()
            .find_map(|c| match c {
                Clause::Match { query } => {
                    let texts: Vec<Option<&str>> =
                        stored.docs.iter().map(|d| d.text.as_deref()).collect();
                    Some(bm25_scores(&texts, query))
                }
                _ => None,
            })
            .unwrap_or_default();

        let mut hits: Vec<SearchHit> = stored
            .docs
            .iter()
            .enumerate()
            .filter_map(|(slot, doc)| {
                let lex = lexical.get(&slot).copied();
                let vec = spec.vector_score(doc);
                if lex.is_none() && vec.is_none() {
                    return None;
                }
                Some(SearchHit {
                    doc_id: doc.doc_id.clone(),
                    score: lex.unwrap_or(0.0) + vec.unwrap_or(0.0),
                    document: doc.clone(),
                })
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(spec.size());
        Ok(hits)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        Ok(read(&self.indices)?
            .get(index)
            .map(|i| i.docs.len())
            .unwrap_or(0))
    }

    async fn get(&self, index: &str, doc_id: &str) -> Result<Option<IndexDocument>> {
        let indices = read(&self.indices)?;
        Ok(indices
            .get(index)
            .and_then(|i| i.slots.get(doc_id).map(|&slot| i.docs[slot].clone())))
    }
}
