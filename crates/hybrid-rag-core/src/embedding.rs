//! Encoder traits, the encoder adapter, and vector utilities.
//!
//! Raw models are consumed through [`TextEncoder`] and [`ImageEncoder`].
//! They may return vectors of any norm; the [`EncoderAdapter`] is the
//! only way the pipeline obtains an [`Embedding`], and it guarantees:
//!
//! - the vector is L2-normalized (norm ≈ 1.0),
//! - its length equals the encoder's declared `dims()`,
//! - image input is a readable file with a supported extension.
//!
//! Concrete encoders (fastembed) live in the `hybrid-rag` app crate.

use std::path::Path;

use crate::error::{Error, Result};
use crate::models::Embedding;
use crate::schema::{IMAGE_VECTOR_FIELD, TEXT_VECTOR_FIELD};

/// File extensions accepted as images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// A text embedding model.
pub trait TextEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the output dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed one text. The result need not be normalized.
    fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// An image embedding model.
pub trait ImageEncoder: Send + Sync {
    /// Returns the model identifier (e.g. `"clip-vit-b-32"`).
    fn model_name(&self) -> &str;
    /// Returns the output dimensionality (e.g. `512`).
    fn dims(&self) -> usize;
    /// Embed the image stored at `path`. The result need not be normalized.
    fn embed_image(&self, path: &Path) -> anyhow::Result<Vec<f32>>;
}

/// Returns true if `path` has one of [`IMAGE_EXTENSIONS`].
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Wraps a text encoder and an image encoder behind the pipeline contract.
pub struct EncoderAdapter<'a> {
    text: &'a dyn TextEncoder,
    image: &'a dyn ImageEncoder,
}

impl<'a> EncoderAdapter<'a> {
    pub fn new(text: &'a dyn TextEncoder, image: &'a dyn ImageEncoder) -> Self {
        Self { text, image }
    }

    pub fn text_dims(&self) -> usize {
        self.text.dims()
    }

    pub fn image_dims(&self) -> usize {
        self.image.dims()
    }

    /// Encode text into a unit-normalized embedding.
    ///
    /// The empty string is valid input. Model failures surface as
    /// [`Error::Encoding`].
    pub fn encode_text(&self, text: &str) -> Result<Embedding> {
        let raw = self.text.embed_text(text).map_err(|e| Error::Encoding {
            input: format!("text ({} chars)", text.chars().count()),
            reason: e.to_string(),
        })?;
        check_dims(TEXT_VECTOR_FIELD, self.text.dims(), raw.len())?;
        Ok(Embedding::normalized(raw))
    }

    /// Encode the image at `path` into a unit-normalized embedding.
    ///
    /// Fails with [`Error::Decode`] if the file is missing, has an
    /// unsupported extension, or the model cannot decode it.
    pub fn encode_image(&self, path: &Path) -> Result<Embedding> {
        let item = path.display().to_string();
        if !is_image_path(path) {
            return Err(Error::decode(
                item,
                format!(
                    "unsupported image extension (expected one of {})",
                    IMAGE_EXTENSIONS.join(", ")
                ),
            ));
        }
        if !path.is_file() {
            return Err(Error::decode(item, "file not found"));
        }
        let raw = self
            .image
            .embed_image(path)
            .map_err(|e| Error::decode(item, e))?;
        check_dims(IMAGE_VECTOR_FIELD, self.image.dims(), raw.len())?;
        Ok(Embedding::normalized(raw))
    }
}

pub(crate) fn check_dims(field: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::DimensionMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Scale `v` to unit L2 norm.
///
/// A zero (or non-finite) norm cannot be normalized; such vectors are
/// replaced by the canonical unit vector `e0` of the same length.
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm < f32::EPSILON {
        v.iter_mut().for_each(|x| *x = 0.0);
        if let Some(first) = v.first_mut() {
            *first = 1.0;
        }
        return v;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use hybrid_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FixedText(Vec<f32>);

    impl TextEncoder for FixedText {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            3
        }
        fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            if text.is_empty() {
                return Ok(vec![0.0; 3]);
            }
            Ok(self.0.clone())
        }
    }

    struct FileLenImage;

    impl ImageEncoder for FileLenImage {
        fn model_name(&self) -> &str {
            "file-len"
        }
        fn dims(&self) -> usize {
            2
        }
        fn embed_image(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
            let bytes = fs::read(path)?;
            if bytes.is_empty() {
                anyhow::bail!("not an image");
            }
            Ok(vec![bytes.len() as f32, 1.0])
        }
    }

    #[test]
    fn test_encode_text_normalized() {
        let text = FixedText(vec![3.0, 4.0, 0.0]);
        let adapter = EncoderAdapter::new(&text, &FileLenImage);
        let e = adapter.encode_text("hello").unwrap();
        assert!((e.norm() - 1.0).abs() < 1e-6);
        assert!((e.as_slice()[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_encode_empty_text_defined_unit_vector() {
        let text = FixedText(vec![3.0, 4.0, 0.0]);
        let adapter = EncoderAdapter::new(&text, &FileLenImage);
        let e = adapter.encode_text("").unwrap();
        assert_eq!(e.as_slice(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_encode_text_dimension_mismatch() {
        let text = FixedText(vec![1.0, 1.0]);
        let adapter = EncoderAdapter::new(&text, &FileLenImage);
        let err = adapter.encode_text("x").unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_encode_image_errors_are_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let text = FixedText(vec![1.0, 0.0, 0.0]);
        let adapter = EncoderAdapter::new(&text, &FileLenImage);

        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "not an image").unwrap();
        assert!(matches!(
            adapter.encode_image(&notes),
            Err(Error::Decode { .. })
        ));

        let missing = dir.path().join("missing.png");
        assert!(matches!(
            adapter.encode_image(&missing),
            Err(Error::Decode { .. })
        ));

        let corrupt = dir.path().join("corrupt.JPG");
        fs::write(&corrupt, b"").unwrap();
        assert!(matches!(
            adapter.encode_image(&corrupt),
            Err(Error::Decode { .. })
        ));

        let good = dir.path().join("good.png");
        fs::write(&good, b"\x89PNG").unwrap();
        let e = adapter.encode_image(&good).unwrap();
        assert!((e.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a/b/photo.JPEG")));
        assert!(is_image_path(Path::new("x.gif")));
        assert!(!is_image_path(Path::new("x.bmp")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical_and_opposite() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
