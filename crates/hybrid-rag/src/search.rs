//! `hrag search`: hybrid retrieval from the command line.
//!
//! Wraps [`hybrid_rag_core::retrieval`] with config handling, store and
//! encoder setup, and CLI output formatting.

use anyhow::Result;
use std::path::Path;

use hybrid_rag_core::embedding::EncoderAdapter;
use hybrid_rag_core::query::HybridQueryBuilder;
use hybrid_rag_core::retrieval::{self, Retrieved};
use hybrid_rag_core::store::Store;

use crate::config::Config;
use crate::encoders::create_encoders;
use crate::sqlite_store::SqliteStore;

/// Run a hybrid query against the configured index.
///
/// A blank text query without an image returns no hits.
pub async fn search_index<S: Store + ?Sized>(
    config: &Config,
    store: &S,
    encoders: &EncoderAdapter<'_>,
    query: &str,
    image: Option<&Path>,
    top_k: Option<usize>,
) -> Result<Retrieved> {
    if query.trim().is_empty() && image.is_none() {
        return Ok(Retrieved::from_hits(Vec::new()));
    }
    let schema = config.schema();
    let builder = HybridQueryBuilder::new(encoders, &schema, config.index.name.clone());
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    Ok(retrieval::retrieve(store, &builder, query, image, top_k).await?)
}

/// CLI entry point: search and print ranked hits to stdout.
pub async fn run_search(
    config: &Config,
    query: &str,
    image: Option<&Path>,
    top_k: Option<usize>,
    explain: bool,
) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let encoders = create_encoders(&config.embedding)?;
    let adapter = encoders.adapter();

    if explain {
        let schema = config.schema();
        let builder = HybridQueryBuilder::new(&adapter, &schema, config.index.name.clone());
        let spec = builder.build_query(query, image, top_k.unwrap_or(config.retrieval.top_k))?;
        println!("{}", serde_json::to_string_pretty(&spec.to_json())?);
        println!();
    }

    let retrieved = search_index(config, &store, &adapter, query, image, top_k).await?;

    if retrieved.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in retrieved.hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {}",
            i + 1,
            hit.score,
            retrieval::source_reference(hit)
        );
        match &hit.document.text {
            Some(text) => println!("    excerpt: \"{}\"", excerpt(text, 160)),
            None => println!("    (image)"),
        }
        println!("    id: {}", hit.doc_id);
        println!();
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
