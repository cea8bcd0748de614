//! Error taxonomy for the retrieval pipeline.
//!
//! Per-item failures during indexing ([`Error::Decode`], and embedding
//! failures on individual chunks) are contained by the
//! [`BatchIndexer`](crate::indexer::BatchIndexer) and recorded in its
//! report. Everything else propagates to the immediate caller.
//!
//! Malformed function-call JSON in a generated response is deliberately
//! absent here: [`extract_function_call`](crate::prompt::extract_function_call)
//! reports it as "no call found".

use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunking, batching, or retrieval parameters.
    #[error("invalid {parameter}: {reason}")]
    Config {
        parameter: &'static str,
        reason: String,
    },

    /// A source item could not be read or decoded (missing file,
    /// unsupported extension, corrupt image).
    #[error("cannot decode {item}: {reason}")]
    Decode { item: String, reason: String },

    /// The encoder failed on query input.
    #[error("failed to encode query {input}: {reason}")]
    Encoding { input: String, reason: String },

    /// The index exists with a schema incompatible with the requested one.
    #[error("incompatible schema for index '{index}': {reason}")]
    Schema { index: String, reason: String },

    /// A bulk write was partially or fully rejected by the store. `failed_ids`
    /// also lists chunks of the same source that were never buffered.
    #[error("flush failed for {} document(s): {reason}", failed_ids.len())]
    Flush {
        failed_ids: Vec<String>,
        reason: String,
    },

    /// An embedding's length does not match the schema field dimension.
    #[error("{field} dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Transport or storage failure reported by a [`Store`](crate::store::Store).
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Error::Config {
            parameter,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(item: impl Into<String>, reason: impl ToString) -> Self {
        Error::Decode {
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the failed document ids when this is a [`Error::Flush`].
    pub fn failed_ids(&self) -> Option<&[String]> {
        match self {
            Error::Flush { failed_ids, .. } => Some(failed_ids),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
