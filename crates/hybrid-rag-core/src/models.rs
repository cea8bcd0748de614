//! Core data models shared by the indexing and query pipelines.
//!
//! These types represent the chunks, embeddings, index documents, and
//! conversation turns that flow between the chunker, the encoder adapter,
//! the batch indexer, the store, and the prompt builder.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::embedding::l2_normalize;

/// A bounded slice of a source text, the unit of text indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Name of the source the chunk was cut from (file stem for files).
    pub source_id: String,
    /// Position of the chunk within its source, contiguous from 0.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Byte offsets of `text` inside the source string.
    pub byte_range: Range<usize>,
}

impl Chunk {
    /// Deterministic document id: `<source-name>-chunk-<index>`.
    pub fn doc_id(&self) -> String {
        chunk_doc_id(&self.source_id, self.chunk_index)
    }
}

/// Build the document id for chunk `index` of `source_id`.
pub fn chunk_doc_id(source_id: &str, index: usize) -> String {
    format!("{}-chunk-{}", source_id, index)
}

/// A unit-normalized embedding vector.
///
/// Construct with [`Embedding::normalized`], which rescales the raw model
/// output to L2 norm 1.0. Deserialization trusts the stored values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize a raw model output. A zero vector becomes `e0`.
    pub fn normalized(raw: Vec<f32>) -> Self {
        Self(l2_normalize(raw))
    }

    /// Wrap values read back from a store, which were normalized on write.
    pub fn from_stored(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// A scalar metadata value.
///
/// Metadata is schema-open (any key), but values are restricted to this
/// closed set so documents stay comparable and serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<usize> for MetadataValue {
    fn from(i: usize) -> Self {
        MetadataValue::Integer(i as i64)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

/// Open-ended document metadata.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Well-known metadata keys.
pub mod meta {
    pub const SOURCE: &str = "source";
    pub const FILENAME: &str = "filename";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const UPLOAD_TIME: &str = "upload_time";
    pub const FORMAT: &str = "format";

    /// `source` value for text chunk documents.
    pub const SOURCE_DOCUMENT: &str = "document";
    /// `source` value for image documents.
    pub const SOURCE_IMAGE: &str = "image";
}

/// Which modality a document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Image,
}

/// A document as written to the index.
///
/// Text documents carry `text` and `text_vector`; image documents carry
/// only `image_vector`. Use [`IndexDocument::text_chunk`] and
/// [`IndexDocument::image`] to keep the two apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_vector: Option<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_vector: Option<Embedding>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl IndexDocument {
    pub fn text_chunk(
        doc_id: impl Into<String>,
        text: impl Into<String>,
        text_vector: Embedding,
        metadata: Metadata,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: Some(text.into()),
            text_vector: Some(text_vector),
            image_vector: None,
            metadata,
        }
    }

    pub fn image(doc_id: impl Into<String>, image_vector: Embedding, metadata: Metadata) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: None,
            text_vector: None,
            image_vector: Some(image_vector),
            metadata,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        if self.image_vector.is_some() {
            DocumentKind::Image
        } else {
            DocumentKind::Text
        }
    }

    /// Metadata `filename`, if recorded.
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get(meta::FILENAME).and_then(|v| v.as_str())
    }
}

/// Speaker of a conversation turn.
///
/// Known roles parse case-insensitively; any other string is kept
/// verbatim as [`Role::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Other(s) => s,
        }
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::Other(s.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a session's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}
