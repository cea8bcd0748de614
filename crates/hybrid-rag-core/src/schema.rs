//! Hybrid index schema and its idempotent creation.
//!
//! An [`IndexSchema`] declares the four fields every index carries: the
//! lexical `text` field, the `text_vector` and `image_vector` dense
//! vector fields, and the open `metadata` object. [`ensure_schema`]
//! creates it once and accepts an existing index only when its schema is
//! identical.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Store;

pub const TEXT_FIELD: &str = "text";
pub const TEXT_VECTOR_FIELD: &str = "text_vector";
pub const IMAGE_VECTOR_FIELD: &str = "image_vector";
pub const METADATA_FIELD: &str = "metadata";

/// Output dimension of the default text encoder (all-MiniLM-L6-v2).
pub const DEFAULT_TEXT_DIMS: usize = 384;
/// Output dimension of the default image encoder (CLIP ViT-B/32).
pub const DEFAULT_IMAGE_DIMS: usize = 512;

/// Vector similarity function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    Cosine,
}

/// Field mapping kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldSpec {
    /// Tokenized, relevance-scored text.
    Text { analyzer: String },
    /// Fixed-dimension dense vector.
    DenseVector { dims: usize, similarity: Similarity },
    /// Schema-free object.
    Object,
}

/// Field layout of a hybrid index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub text: FieldSpec,
    pub text_vector: FieldSpec,
    pub image_vector: FieldSpec,
    pub metadata: FieldSpec,
}

impl IndexSchema {
    /// Hybrid schema with the given vector dimensions.
    pub fn hybrid(text_dims: usize, image_dims: usize) -> Self {
        Self {
            text: FieldSpec::Text {
                analyzer: "standard".to_string(),
            },
            text_vector: FieldSpec::DenseVector {
                dims: text_dims,
                similarity: Similarity::Cosine,
            },
            image_vector: FieldSpec::DenseVector {
                dims: image_dims,
                similarity: Similarity::Cosine,
            },
            metadata: FieldSpec::Object,
        }
    }

    /// Declared dimension of `text_vector`.
    pub fn text_dims(&self) -> usize {
        vector_dims(&self.text_vector)
    }

    /// Declared dimension of `image_vector`.
    pub fn image_dims(&self) -> usize {
        vector_dims(&self.image_vector)
    }

    /// Describe the first difference between `self` and `other`, if any.
    pub fn incompatibility(&self, other: &IndexSchema) -> Option<String> {
        let fields = [
            (TEXT_FIELD, &self.text, &other.text),
            (TEXT_VECTOR_FIELD, &self.text_vector, &other.text_vector),
            (IMAGE_VECTOR_FIELD, &self.image_vector, &other.image_vector),
            (METADATA_FIELD, &self.metadata, &other.metadata),
        ];
        fields
            .into_iter()
            .find(|(_, a, b)| a != b)
            .map(|(name, a, b)| format!("field '{}' is {:?}, requested {:?}", name, a, b))
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::hybrid(DEFAULT_TEXT_DIMS, DEFAULT_IMAGE_DIMS)
    }
}

fn vector_dims(spec: &FieldSpec) -> usize {
    match spec {
        FieldSpec::DenseVector { dims, .. } => *dims,
        _ => 0,
    }
}

/// Create `index_name` with `schema` unless it already exists.
///
/// Idempotent: an existing index with an identical schema is accepted.
/// An existing index with a different schema fails with
/// [`Error::Schema`]; the pipeline cannot proceed against it.
pub async fn ensure_schema<S: Store + ?Sized>(
    store: &S,
    index_name: &str,
    schema: &IndexSchema,
) -> Result<()> {
    match store.index_schema(index_name).await? {
        Some(existing) => {
            if let Some(reason) = existing.incompatibility(schema) {
                return Err(Error::Schema {
                    index: index_name.to_string(),
                    reason,
                });
            }
            tracing::debug!(index = index_name, "index already exists");
            Ok(())
        }
        None => {
            store
                .create_index(index_name, schema)
                .await
                .map_err(|e| Error::Schema {
                    index: index_name.to_string(),
                    reason: format!("create failed: {:#}", e),
                })?;
            tracing::info!(
                index = index_name,
                text_dims = schema.text_dims(),
                image_dims = schema.image_dims(),
                "created index"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_ensure_schema_idempotent() {
        let store = InMemoryStore::new();
        let schema = IndexSchema::default();
        ensure_schema(&store, "products", &schema).await.unwrap();
        ensure_schema(&store, "products", &schema).await.unwrap();
        assert_eq!(
            store.index_schema("products").await.unwrap(),
            Some(schema)
        );
    }

    #[tokio::test]
    async fn test_ensure_schema_incompatible() {
        let store = InMemoryStore::new();
        ensure_schema(&store, "products", &IndexSchema::hybrid(384, 512))
            .await
            .unwrap();
        let err = ensure_schema(&store, "products", &IndexSchema::hybrid(768, 512))
            .await
            .unwrap_err();
        match err {
            Error::Schema { index, reason } => {
                assert_eq!(index, "products");
                assert!(reason.contains("text_vector"));
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_json_shape() {
        let json = serde_json::to_value(IndexSchema::default()).unwrap();
        assert_eq!(json["text"]["type"], "text");
        assert_eq!(json["text_vector"]["type"], "dense_vector");
        assert_eq!(json["text_vector"]["dims"], 384);
        assert_eq!(json["image_vector"]["similarity"], "cosine");
        assert_eq!(json["metadata"]["type"], "object");
    }
}
