//! Batched conversion of text and image sources into index documents.
//!
//! A [`BatchIndexer`] chunks and encodes sources, buffers the resulting
//! [`IndexDocument`]s, and writes them to the store whenever the buffer
//! reaches `batch_size`, plus a final flush in [`BatchIndexer::finish`].
//!
//! # Failure policy
//!
//! - Per-item failures (unreadable file, empty source, undecodable image,
//!   embedding failure on one chunk) are logged with the offending id,
//!   recorded in the [`IndexReport`], and skipped. The run continues.
//! - A rejected flush returns [`Error::Flush`] with the failed ids. Those
//!   documents stay buffered; the caller either retries with
//!   [`BatchIndexer::flush`] or drops them with
//!   [`BatchIndexer::discard_pending`]. Until then new items are refused,
//!   so the buffer never grows past `batch_size`.
//! - If that flush happens partway through a text source, the source's
//!   later chunks are never buffered. They are recorded as
//!   [`SkipReason::NotBuffered`] and their ids are appended to the
//!   error's `failed_ids`; re-indexing the source writes them.
//! - Dimension mismatches between encoder output and schema are fatal.
//!
//! Document ids are deterministic (`<source>-chunk-<i>` for text, the file
//! name for images), so re-running over the same sources overwrites.
//!
//! Each indexer owns its buffer. Several indexers may share one store and
//! flush concurrently.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::chunk::{chunk_text, ChunkParams};
use crate::embedding::{check_dims, EncoderAdapter};
use crate::error::{Error, Result};
use crate::models::{meta, Chunk, IndexDocument, Metadata};
use crate::schema::{IndexSchema, IMAGE_VECTOR_FIELD, TEXT_VECTOR_FIELD};
use crate::store::Store;

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source contained no text.
    Empty,
    /// The file could not be read.
    Unreadable(String),
    /// The image could not be decoded.
    Decode(String),
    /// The encoder failed on this item.
    Embedding(String),
    /// A flush failed before this chunk could be buffered.
    NotBuffered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty source"),
            SkipReason::Unreadable(e) => write!(f, "unreadable: {}", e),
            SkipReason::Decode(e) => write!(f, "decode failed: {}", e),
            SkipReason::Embedding(e) => write!(f, "embedding failed: {}", e),
            SkipReason::NotBuffered => write!(f, "not buffered after failed flush"),
        }
    }
}

/// A skipped source item or chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    /// File path, source id, or chunk doc id.
    pub item: String,
    pub reason: SkipReason,
}

/// Accumulated outcome of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Ids confirmed written by the store, in flush order.
    pub written: Vec<String>,
    /// Items that were skipped, in encounter order.
    pub skipped: Vec<SkippedItem>,
    /// Size of each successful flush, in order.
    pub flushes: Vec<usize>,
    /// Ids dropped via [`BatchIndexer::discard_pending`].
    pub discarded: Vec<String>,
}

impl IndexReport {
    pub fn documents_written(&self) -> usize {
        self.written.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Buffers index documents and flushes them in bounded batches.
pub struct BatchIndexer<'a, S: Store + ?Sized> {
    store: &'a S,
    encoders: &'a EncoderAdapter<'a>,
    schema: &'a IndexSchema,
    index: String,
    chunking: ChunkParams,
    batch_size: usize,
    buffer: Vec<IndexDocument>,
    report: IndexReport,
}

impl<'a, S: Store + ?Sized> BatchIndexer<'a, S> {
    /// Create an indexer writing into `index`.
    ///
    /// Fails with [`Error::Config`] if `batch_size` is zero.
    pub fn new(
        store: &'a S,
        encoders: &'a EncoderAdapter<'a>,
        schema: &'a IndexSchema,
        index: impl Into<String>,
        chunking: ChunkParams,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("batch_size", "must be > 0"));
        }
        Ok(Self {
            store,
            encoders,
            schema,
            index: index.into(),
            chunking,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            report: IndexReport::default(),
        })
    }

    /// Documents buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Report accumulated so far.
    pub fn report(&self) -> &IndexReport {
        &self.report
    }

    /// Chunk, encode, and buffer one text source.
    ///
    /// Returns the number of chunk documents produced. Empty text is
    /// recorded as skipped and yields `0`.
    pub async fn index_text_source(&mut self, source_id: &str, text: &str) -> Result<usize> {
        self.index_text(source_id, text, None).await
    }

    /// Read a text file and index it under its file stem.
    ///
    /// Surrounding whitespace is trimmed. An unreadable file is recorded as
    /// skipped and yields `0`.
    pub async fn index_text_file(&mut self, path: &Path) -> Result<usize> {
        let item = path.display().to_string();
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                self.skip(item, SkipReason::Unreadable(e.to_string()));
                return Ok(0);
            }
        };
        let source_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.clone());
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(item);
        self.index_text(&source_id, text.trim(), Some(&filename)).await
    }

    async fn index_text(
        &mut self,
        source_id: &str,
        text: &str,
        filename: Option<&str>,
    ) -> Result<usize> {
        self.ensure_accepting()?;

        let chunks = chunk_text(source_id, text, &self.chunking);
        if chunks.is_empty() {
            self.skip(filename.unwrap_or(source_id), SkipReason::Empty);
            return Ok(0);
        }

        let mut produced = 0;
        let mut remaining = chunks.into_iter();
        while let Some(chunk) = remaining.next() {
            let doc_id = chunk.doc_id();
            let vector = match self.encoders.encode_text(&chunk.text) {
                Ok(v) => v,
                Err(Error::Encoding { reason, .. }) => {
                    self.skip(doc_id, SkipReason::Embedding(reason));
                    continue;
                }
                Err(e) => return Err(e),
            };
            check_dims(TEXT_VECTOR_FIELD, self.schema.text_dims(), vector.dims())?;

            let mut metadata = Metadata::new();
            metadata.insert(meta::SOURCE.into(), meta::SOURCE_DOCUMENT.into());
            metadata.insert(meta::CHUNK_INDEX.into(), chunk.chunk_index.into());
            if let Some(name) = filename {
                metadata.insert(meta::FILENAME.into(), name.into());
            }

            let doc = IndexDocument::text_chunk(doc_id, chunk.text, vector, metadata);
            if let Err(err) = self.push(doc).await {
                return Err(self.abandon_rest(err, remaining));
            }
            produced += 1;
        }
        Ok(produced)
    }

    /// Record the chunks of a source left unbuffered by a failed flush.
    fn abandon_rest(&mut self, err: Error, rest: impl Iterator<Item = Chunk>) -> Error {
        let Error::Flush {
            mut failed_ids,
            reason,
        } = err
        else {
            return err;
        };
        let rest: Vec<String> = rest.map(|c| c.doc_id()).collect();
        if rest.is_empty() {
            return Error::Flush { failed_ids, reason };
        }
        for id in &rest {
            self.skip(id.clone(), SkipReason::NotBuffered);
        }
        let reason = format!("{}; {} later chunk(s) not buffered", reason, rest.len());
        failed_ids.extend(rest);
        Error::Flush { failed_ids, reason }
    }

    /// Encode and buffer one image, keyed by its file name.
    ///
    /// Returns `1` if the image was buffered, `0` if it was skipped.
    pub async fn index_image_source(&mut self, path: &Path) -> Result<usize> {
        self.ensure_accepting()?;

        let vector = match self.encoders.encode_image(path) {
            Ok(v) => v,
            Err(Error::Decode { item, reason }) => {
                self.skip(item, SkipReason::Decode(reason));
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        check_dims(IMAGE_VECTOR_FIELD, self.schema.image_dims(), vector.dims())?;

        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut metadata = Metadata::new();
        metadata.insert(meta::SOURCE.into(), meta::SOURCE_IMAGE.into());
        metadata.insert(meta::FILENAME.into(), filename.clone().into());
        if let Some(ext) = path.extension() {
            metadata.insert(meta::FORMAT.into(), ext.to_string_lossy().into_owned().into());
        }
        if let Some(modified) = std::fs::metadata(path).and_then(|m| m.modified()).ok() {
            let ts: DateTime<Utc> = modified.into();
            metadata.insert(
                meta::UPLOAD_TIME.into(),
                (ts.timestamp_millis() as f64 / 1000.0).into(),
            );
        }

        self.push(IndexDocument::image(filename, vector, metadata))
            .await?;
        Ok(1)
    }

    /// Write all buffered documents.
    ///
    /// Returns the number of documents written. On rejection returns
    /// [`Error::Flush`]; the rejected documents remain buffered and the
    /// accepted ones are recorded as written.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let response = match self.store.bulk_write(&self.index, &self.buffer).await {
            Ok(r) => r,
            Err(e) => {
                let failed_ids = self.pending_ids();
                tracing::error!(
                    index = %self.index,
                    pending = failed_ids.len(),
                    error = %e,
                    "bulk write failed"
                );
                return Err(Error::Flush {
                    failed_ids,
                    reason: format!("{:#}", e),
                });
            }
        };

        if response.failed.is_empty() {
            let n = self.buffer.len();
            self.buffer.clear();
            self.report.written.extend(response.succeeded);
            self.report.flushes.push(n);
            tracing::info!(index = %self.index, documents = n, "flushed batch");
            return Ok(n);
        }

        self.buffer.retain(|d| response.failed.contains(&d.doc_id));
        self.report.written.extend(response.succeeded);
        tracing::error!(
            index = %self.index,
            failed = response.failed.len(),
            "bulk write partially rejected"
        );
        Err(Error::Flush {
            failed_ids: response.failed,
            reason: "rejected by store".to_string(),
        })
    }

    /// Drop buffered documents after a failed flush, returning their ids.
    pub fn discard_pending(&mut self) -> Vec<String> {
        let ids = self.pending_ids();
        self.buffer.clear();
        self.report.discarded.extend(ids.iter().cloned());
        if !ids.is_empty() {
            tracing::warn!(index = %self.index, discarded = ids.len(), "discarded pending documents");
        }
        ids
    }

    /// Flush the remainder and hand back the run's report.
    ///
    /// On flush failure the indexer keeps its buffer and report, so
    /// `finish` may be retried.
    pub async fn finish(&mut self) -> Result<IndexReport> {
        self.flush().await?;
        let report = std::mem::take(&mut self.report);
        tracing::info!(
            index = %self.index,
            written = report.documents_written(),
            skipped = report.skipped_count(),
            flushes = report.flushes.len(),
            "indexing run complete"
        );
        Ok(report)
    }

    async fn push(&mut self, doc: IndexDocument) -> Result<()> {
        self.buffer.push(doc);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.buffer.len() >= self.batch_size {
            return Err(Error::Flush {
                failed_ids: self.pending_ids(),
                reason: "previous flush failed; retry flush() or discard_pending()".to_string(),
            });
        }
        Ok(())
    }

    fn pending_ids(&self) -> Vec<String> {
        self.buffer.iter().map(|d| d.doc_id.clone()).collect()
    }

    fn skip(&mut self, item: impl Into<String>, reason: SkipReason) {
        let item = item.into();
        tracing::warn!(item = %item, reason = %reason, "skipping item");
        self.report.skipped.push(SkippedItem { item, reason });
    }
}
