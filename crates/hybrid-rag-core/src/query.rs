//! Hybrid query construction.
//!
//! [`HybridQueryBuilder::build_query`] turns a text query (and optionally a
//! query image) into an immutable [`QuerySpec`]: a disjunctive request of
//! up to three independently scored clauses.
//!
//! | Clause | Field | Contribution |
//! |--------|-------|--------------|
//! | [`Clause::Match`] | `text` | store's BM25 relevance |
//! | [`Clause::VectorSimilarity`] (text) | `text_vector` | `cosine + 1.0` ∈ `[0, 2]` |
//! | [`Clause::VectorSimilarity`] (image) | `image_vector` | `cosine + 1.0` ∈ `[0, 2]` |
//!
//! The image clause is present exactly when an image path is supplied.
//! Clauses carry no weights: a document's score is the sum of the
//! contributions of the clauses it matches, and a document without a
//! clause's field simply does not match that clause.
//!
//! Building a query performs no I/O against the store; the store executes
//! the resulting [`QuerySpec`] in [`Store::search`](crate::store::Store::search).

use std::path::Path;

use serde_json::{json, Value};

use crate::embedding::{check_dims, cosine_similarity, EncoderAdapter};
use crate::error::{Error, Result};
use crate::models::{Embedding, IndexDocument};
use crate::schema::{IndexSchema, IMAGE_VECTOR_FIELD, TEXT_FIELD, TEXT_VECTOR_FIELD};

/// Offset added to cosine similarity so vector contributions are non-negative.
pub const COSINE_OFFSET: f32 = 1.0;

/// Dense vector field targeted by a similarity clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorField {
    Text,
    Image,
}

impl VectorField {
    pub fn name(&self) -> &'static str {
        match self {
            VectorField::Text => TEXT_VECTOR_FIELD,
            VectorField::Image => IMAGE_VECTOR_FIELD,
        }
    }

    /// The document's vector for this field, if it has one.
    pub fn of<'d>(&self, doc: &'d IndexDocument) -> Option<&'d Embedding> {
        match self {
            VectorField::Text => doc.text_vector.as_ref(),
            VectorField::Image => doc.image_vector.as_ref(),
        }
    }
}

/// One scoring clause of a hybrid query.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Lexical match against the `text` field.
    Match { query: String },
    /// `cosine(vector, doc[field]) + offset`.
    VectorSimilarity {
        field: VectorField,
        vector: Embedding,
        offset: f32,
    },
}

impl Clause {
    /// Score a document against a vector clause.
    ///
    /// Returns `None` for [`Clause::Match`] (lexical scoring belongs to the
    /// store) and for documents lacking the clause's vector field.
    pub fn vector_score(&self, doc: &IndexDocument) -> Option<f64> {
        match self {
            Clause::Match { .. } => None,
            Clause::VectorSimilarity {
                field,
                vector,
                offset,
            } => field
                .of(doc)
                .map(|v| (cosine_similarity(vector.as_slice(), v.as_slice()) + offset) as f64),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Clause::Match { query } => json!({ "match": { TEXT_FIELD: query } }),
            Clause::VectorSimilarity {
                field,
                vector,
                offset,
            } => {
                let name = field.name();
                json!({
                    "script_score": {
                        "query": { "match_all": {} },
                        "script": {
                            "source": format!(
                                "cosineSimilarity(params.{name}, '{name}') + {offset:.1}"
                            ),
                            "params": { name: vector.as_slice() },
                        }
                    }
                })
            }
        }
    }
}

/// An immutable, fully-encoded hybrid retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    index: String,
    clauses: Vec<Clause>,
    size: usize,
}

impl QuerySpec {
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Clauses in order: lexical, text vector, then image vector if any.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Maximum number of hits (`top_k`).
    pub fn size(&self) -> usize {
        self.size
    }

    /// The lexical query text.
    pub fn lexical_query(&self) -> Option<&str> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Match { query } => Some(query.as_str()),
            _ => None,
        })
    }

    /// Number of clauses targeting `field`.
    pub fn vector_clause_count(&self, field: VectorField) -> usize {
        self.clauses
            .iter()
            .filter(|c| matches!(c, Clause::VectorSimilarity { field: f, .. } if *f == field))
            .count()
    }

    pub fn has_image_clause(&self) -> bool {
        self.vector_clause_count(VectorField::Image) > 0
    }

    /// Sum of the vector clause contributions for `doc`, or `None` if no
    /// vector clause applies to it.
    pub fn vector_score(&self, doc: &IndexDocument) -> Option<f64> {
        self.clauses
            .iter()
            .filter_map(|c| c.vector_score(doc))
            .fold(None, |acc, s| Some(acc.unwrap_or(0.0) + s))
    }

    /// Render as an Elasticsearch-style `bool.should` request body.
    pub fn to_json(&self) -> Value {
        json!({
            "query": {
                "bool": {
                    "should": self.clauses.iter().map(Clause::to_json).collect::<Vec<_>>()
                }
            },
            "size": self.size,
        })
    }
}

/// Builds [`QuerySpec`]s for one index.
pub struct HybridQueryBuilder<'a> {
    encoders: &'a EncoderAdapter<'a>,
    schema: &'a IndexSchema,
    index: String,
}

impl<'a> HybridQueryBuilder<'a> {
    pub fn new(
        encoders: &'a EncoderAdapter<'a>,
        schema: &'a IndexSchema,
        index: impl Into<String>,
    ) -> Self {
        Self {
            encoders,
            schema,
            index: index.into(),
        }
    }

    /// Encode the query and assemble the fused request.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `top_k` is zero.
    /// - [`Error::Encoding`] if the query text or image cannot be encoded.
    /// - [`Error::DimensionMismatch`] if an encoder's output does not match
    ///   the schema's field dimension.
    pub fn build_query(
        &self,
        text_query: &str,
        image_path: Option<&Path>,
        top_k: usize,
    ) -> Result<QuerySpec> {
        if top_k == 0 {
            return Err(Error::config("top_k", "must be >= 1"));
        }

        let text_vector = self.encoders.encode_text(text_query)?;
        check_dims(TEXT_VECTOR_FIELD, self.schema.text_dims(), text_vector.dims())?;

        let mut clauses = vec![
            Clause::Match {
                query: text_query.to_string(),
            },
            Clause::VectorSimilarity {
                field: VectorField::Text,
                vector: text_vector,
                offset: COSINE_OFFSET,
            },
        ];

        if let Some(path) = image_path {
            let image_vector = self.encoders.encode_image(path).map_err(|e| match e {
                Error::Decode { item, reason } => Error::Encoding {
                    input: format!("image {}", item),
                    reason,
                },
                other => other,
            })?;
            check_dims(IMAGE_VECTOR_FIELD, self.schema.image_dims(), image_vector.dims())?;
            clauses.push(Clause::VectorSimilarity {
                field: VectorField::Image,
                vector: image_vector,
                offset: COSINE_OFFSET,
            });
        }

        let spec = QuerySpec {
            index: self.index.clone(),
            clauses,
            size: top_k,
        };
        tracing::debug!(
            index = %spec.index,
            clauses = spec.clauses.len(),
            size = spec.size,
            "built hybrid query"
        );
        Ok(spec)
    }
}
