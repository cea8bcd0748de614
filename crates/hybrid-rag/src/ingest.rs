//! `hrag index`: walk the configured source directories and index them.
//!
//! Text sources are the `*.txt` files under `indexing.data_path`. Every
//! regular file under `indexing.image_path` is offered to the image
//! indexer, so stray non-image files show up as skipped items in the
//! report instead of vanishing silently. Both walks are sorted by path so
//! runs are reproducible.
//!
//! A run that fails partway (rejected flush, fatal dimension mismatch)
//! returns [`IndexAborted`] with the report accumulated up to that point.
//! Documents still buffered are discarded and listed in it.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use hybrid_rag_core::embedding::EncoderAdapter;
use hybrid_rag_core::indexer::{BatchIndexer, IndexReport};
use hybrid_rag_core::store::Store;

use crate::config::Config;
use crate::encoders::create_encoders;
use crate::sqlite_store::SqliteStore;

/// Which sources an indexing run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexTarget {
    Text,
    Images,
    All,
}

impl IndexTarget {
    fn includes_text(self) -> bool {
        matches!(self, IndexTarget::Text | IndexTarget::All)
    }

    fn includes_images(self) -> bool {
        matches!(self, IndexTarget::Images | IndexTarget::All)
    }
}

/// Sorted regular files under `root`. A missing root yields no files.
pub fn walk_files(root: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        tracing::warn!(path = %root.display(), "source directory does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let wanted = match extension {
            Some(ext) => path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(false),
            None => true,
        };
        if wanted {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// An indexing run that stopped before finishing.
#[derive(Debug)]
pub struct IndexAborted {
    /// What was written, skipped, and discarded before the failure.
    pub report: IndexReport,
    pub error: anyhow::Error,
}

impl fmt::Display for IndexAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "indexing aborted after {} document(s) written",
            self.report.documents_written()
        )
    }
}

impl std::error::Error for IndexAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.error)
    }
}

impl IndexAborted {
    fn before_start(error: anyhow::Error) -> Self {
        Self {
            report: IndexReport::default(),
            error,
        }
    }
}

/// Index `target` sources with the given encoders into `store`.
pub async fn index_sources<S: Store + ?Sized>(
    config: &Config,
    store: &S,
    encoders: &EncoderAdapter<'_>,
    target: IndexTarget,
) -> std::result::Result<IndexReport, IndexAborted> {
    let schema = config.schema();
    let params = config.chunk_params().map_err(IndexAborted::before_start)?;
    let mut indexer = BatchIndexer::new(
        store,
        encoders,
        &schema,
        config.index.name.clone(),
        params,
        config.indexing.batch_size,
    )
    .map_err(|e| IndexAborted::before_start(e.into()))?;

    match run_sources(config, &mut indexer, target).await {
        Ok(report) => Ok(report),
        Err(error) => {
            indexer.discard_pending();
            tracing::error!(error = %format!("{:#}", error), "indexing run aborted");
            Err(IndexAborted {
                report: indexer.report().clone(),
                error,
            })
        }
    }
}

async fn run_sources<S: Store + ?Sized>(
    config: &Config,
    indexer: &mut BatchIndexer<'_, S>,
    target: IndexTarget,
) -> Result<IndexReport> {
    if target.includes_text() {
        let files = walk_files(&config.indexing.data_path, Some("txt"))?;
        tracing::info!(
            path = %config.indexing.data_path.display(),
            files = files.len(),
            "indexing text sources"
        );
        for path in &files {
            indexer.index_text_file(path).await?;
        }
    }

    if target.includes_images() {
        let files = walk_files(&config.indexing.image_path, None)?;
        tracing::info!(
            path = %config.indexing.image_path.display(),
            files = files.len(),
            "indexing image sources"
        );
        for path in &files {
            indexer.index_image_source(path).await?;
        }
    }

    Ok(indexer.finish().await?)
}

/// Print a run summary to stdout.
pub fn print_report(report: &IndexReport) {
    println!(
        "Indexed {} document(s) in {} batch(es).",
        report.documents_written(),
        report.flushes.len()
    );
    if !report.skipped.is_empty() {
        println!("Skipped {} item(s):", report.skipped_count());
        for item in &report.skipped {
            println!("  {}: {}", item.item, item.reason);
        }
    }
    if !report.discarded.is_empty() {
        println!("Discarded {} pending document(s).", report.discarded.len());
    }
}

/// Entry point for `hrag index`.
pub async fn run_index(config: &Config, target: IndexTarget) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let encoders = create_encoders(&config.embedding)?;
    let adapter = encoders.adapter();

    let report = match index_sources(config, &store, &adapter, target).await {
        Ok(report) => report,
        Err(aborted) => {
            print_report(&aborted.report);
            return Err(aborted.into());
        }
    };
    print_report(&report);
    println!(
        "Index '{}' now holds {} document(s).",
        config.index.name,
        store.count(&config.index.name).await?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hybrid_rag_core::embedding::{ImageEncoder, TextEncoder};
    use hybrid_rag_core::schema::ensure_schema;
    use hybrid_rag_core::store::memory::InMemoryStore;
    use std::fs;

    struct CountingText;

    impl TextEncoder for CountingText {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            3
        }
        fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32, 0.5])
        }
    }

    struct MagicImage;

    impl ImageEncoder for MagicImage {
        fn model_name(&self) -> &str {
            "magic"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_image(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
            let bytes = fs::read(path)?;
            if !bytes.starts_with(b"IMG") {
                anyhow::bail!("bad image");
            }
            Ok(vec![1.0, 1.0])
        }
    }

    fn test_config(root: &Path) -> Config {
        let mut config = Config::minimal();
        config.db.path = root.join("hrag.sqlite");
        config.indexing.data_path = root.join("docs");
        config.indexing.image_path = root.join("images");
        config.indexing.batch_size = 2;
        config.chunking.chunk_size = 20;
        config.chunking.overlap = 5;
        config.embedding.text_dims = 3;
        config.embedding.image_dims = 2;
        config
    }

    #[test]
    fn test_walk_files_filters_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("b.txt"), "b").unwrap();
        fs::write(tmp.path().join("nested/a.TXT"), "a").unwrap();
        fs::write(tmp.path().join("c.md"), "c").unwrap();

        let txt = walk_files(tmp.path(), Some("txt")).unwrap();
        assert_eq!(txt.len(), 2);
        assert!(txt[0].ends_with("b.txt"));
        assert_eq!(walk_files(tmp.path(), None).unwrap().len(), 3);
        assert!(walk_files(&tmp.path().join("missing"), None)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_index_sources_all() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        fs::create_dir_all(&config.indexing.data_path).unwrap();
        fs::create_dir_all(&config.indexing.image_path).unwrap();
        fs::write(
            config.indexing.data_path.join("jackets.txt"),
            "Item A: long down jacket, white duck down.",
        )
        .unwrap();
        fs::write(config.indexing.data_path.join("readme.md"), "ignored").unwrap();
        fs::write(config.indexing.image_path.join("a.png"), b"IMG1").unwrap();
        fs::write(config.indexing.image_path.join("notes.txt"), b"IMG2").unwrap();

        let store = InMemoryStore::new();
        ensure_schema(&store, &config.index.name, &config.schema())
            .await
            .unwrap();
        let adapter = EncoderAdapter::new(&CountingText, &MagicImage);

        let report = index_sources(&config, &store, &adapter, IndexTarget::All)
            .await
            .unwrap();
        // 42 chars at 20/5 → 3 chunks, plus one image.
        assert_eq!(report.documents_written(), 4);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].item.ends_with("notes.txt"));
        assert_eq!(store.write_batches().unwrap(), vec![2, 2]);

        let text_only = index_sources(&config, &store, &adapter, IndexTarget::Text)
            .await
            .unwrap();
        assert_eq!(text_only.documents_written(), 3);
        assert_eq!(store.count(&config.index.name).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_rejected_flush_returns_partial_report() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        fs::create_dir_all(&config.indexing.data_path).unwrap();
        fs::write(
            config.indexing.data_path.join("jackets.txt"),
            "Item A: long down jacket, white duck down.",
        )
        .unwrap();

        let store = InMemoryStore::new();
        ensure_schema(&store, &config.index.name, &config.schema())
            .await
            .unwrap();
        store.reject_ids(["jackets-chunk-1"]).unwrap();
        let adapter = EncoderAdapter::new(&CountingText, &MagicImage);

        let aborted = index_sources(&config, &store, &adapter, IndexTarget::Text)
            .await
            .unwrap_err();
        assert_eq!(aborted.report.written, vec!["jackets-chunk-0"]);
        assert_eq!(aborted.report.discarded, vec!["jackets-chunk-1"]);
        assert_eq!(aborted.report.skipped.len(), 1);
        assert_eq!(aborted.report.skipped[0].item, "jackets-chunk-2");
        assert!(aborted.to_string().contains("1 document(s) written"));
        assert!(format!("{:#}", anyhow::Error::from(aborted)).contains("flush failed"));
    }
}
