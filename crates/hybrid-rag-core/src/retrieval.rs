//! Query execution and conversion of hits into prompt material.
//!
//! [`retrieve`] builds a [`QuerySpec`] with a [`HybridQueryBuilder`],
//! runs it against a [`Store`], and splits the ranked hits into context
//! strings (text hits only) and source references (every hit).

use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::models::DocumentKind;
use crate::query::{HybridQueryBuilder, QuerySpec};
use crate::store::{SearchHit, Store};

/// Ranked hits plus the derived prompt material.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieved {
    pub hits: Vec<SearchHit>,
    /// Text of each text hit, in rank order.
    pub contexts: Vec<String>,
    /// File name (or doc id) of each hit, in rank order.
    pub sources: Vec<String>,
}

impl Retrieved {
    pub fn from_hits(hits: Vec<SearchHit>) -> Self {
        let contexts = hits
            .iter()
            .filter(|h| h.document.kind() == DocumentKind::Text)
            .filter_map(|h| h.document.text.clone())
            .collect();
        let sources = hits.iter().map(source_reference).collect();
        Self {
            hits,
            contexts,
            sources,
        }
    }
}

/// Human-facing reference for a hit: its file name, else its doc id.
pub fn source_reference(hit: &SearchHit) -> String {
    hit.document
        .filename()
        .map(str::to_string)
        .unwrap_or_else(|| hit.doc_id.clone())
}

/// Build and execute a hybrid query.
///
/// Encoding failures surface before the store is contacted.
pub async fn retrieve<S: Store + ?Sized>(
    store: &S,
    builder: &HybridQueryBuilder<'_>,
    text_query: &str,
    image_path: Option<&Path>,
    top_k: usize,
) -> Result<Retrieved> {
    let spec = builder.build_query(text_query, image_path, top_k)?;
    let hits = execute(store, &spec).await?;
    Ok(Retrieved::from_hits(hits))
}

/// Execute a prepared query.
pub async fn execute<S: Store + ?Sized>(store: &S, spec: &QuerySpec) -> Result<Vec<SearchHit>> {
    let hits = store.search(spec).await?;
    tracing::debug!(index = spec.index(), hits = hits.len(), "search complete");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{meta, Embedding, IndexDocument, Metadata};

    fn hit(doc: IndexDocument, score: f64) -> SearchHit {
        SearchHit {
            doc_id: doc.doc_id.clone(),
            score,
            document: doc,
        }
    }

    #[test]
    fn test_image_hits_are_sources_not_contexts() {
        let mut text_meta = Metadata::new();
        text_meta.insert(meta::FILENAME.into(), "jackets.txt".into());
        let mut img_meta = Metadata::new();
        img_meta.insert(meta::FILENAME.into(), "a.png".into());

        let hits = vec![
            hit(
                IndexDocument::image("a.png", Embedding::normalized(vec![1.0]), img_meta),
                3.0,
            ),
            hit(
                IndexDocument::text_chunk(
                    "jackets-chunk-0",
                    "long down jacket",
                    Embedding::normalized(vec![1.0]),
                    text_meta,
                ),
                2.0,
            ),
            hit(
                IndexDocument::text_chunk(
                    "raw-chunk-0",
                    "scarf",
                    Embedding::normalized(vec![1.0]),
                    Metadata::new(),
                ),
                1.0,
            ),
        ];
        let r = Retrieved::from_hits(hits);
        assert_eq!(r.contexts, vec!["long down jacket", "scarf"]);
        assert_eq!(r.sources, vec!["a.png", "jackets.txt", "raw-chunk-0"]);
    }
}
