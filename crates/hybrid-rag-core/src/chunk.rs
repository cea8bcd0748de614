//! Fixed-size sliding-window text chunker.
//!
//! Splits source text into [`Chunk`]s of `chunk_size` characters whose
//! starts advance by `chunk_size - overlap`, so consecutive chunks share
//! `overlap` characters of content. The final chunk may be shorter.
//!
//! Sizes are counted in characters (Unicode scalar values), never bytes,
//! so a chunk boundary never falls inside a multi-byte code point. Each
//! chunk records its byte range in the source for slicing back.
//!
//! # Algorithm
//!
//! 1. Validate `overlap < chunk_size` (see [`ChunkParams::new`]).
//! 2. Chunk `i` covers characters `[i × stride, i × stride + chunk_size)`,
//!    clipped to the text length.
//! 3. Stop after the first chunk that reaches the end of the text, so no
//!    chunk lies entirely inside its predecessor's overlap.
//!
//! Empty text produces no chunks.
//!
//! # Example
//!
//! ```rust
//! use hybrid_rag_core::chunk::{chunk_text, ChunkParams};
//!
//! let params = ChunkParams::new(512, 50).unwrap();
//! let text = "x".repeat(1000);
//! let chunks = chunk_text("manual", &text, &params);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[1].doc_id(), "manual-chunk-1");
//! ```

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkParams {
    /// Validate chunking parameters.
    ///
    /// Fails with [`Error::Config`] when `chunk_size` is zero or
    /// `overlap >= chunk_size` (the window would never advance).
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size", "must be > 0"));
        }
        if overlap >= chunk_size {
            return Err(Error::config(
                "overlap",
                format!(
                    "must be smaller than chunk_size ({} >= {})",
                    overlap, chunk_size
                ),
            ));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between consecutive chunk starts.
    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Split `text` into overlapping chunks tagged with `source_id`.
///
/// # Guarantees
///
/// - Indices are contiguous: `0, 1, …, N-1`.
/// - Every character of `text` is in at least one chunk.
/// - For `len > chunk_size`, `N = ceil((len - overlap) / stride)`; for
///   `0 < len <= chunk_size`, `N = 1`; for empty text, `N = 0`.
pub fn chunk_text(source_id: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let len = offsets.len();
    let byte_at = |pos: usize| offsets.get(pos).copied().unwrap_or(text.len());

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = (start + params.chunk_size).min(len);
        let byte_range = byte_at(start)..byte_at(end);
        chunks.push(Chunk {
            source_id: source_id.to_string(),
            chunk_index: chunks.len(),
            text: text[byte_range.clone()].to_string(),
            byte_range,
        });
        if end == len {
            break;
        }
        start += params.stride();
    }

    chunks
}

/// Split `text` into chunk strings.
///
/// Convenience form of [`chunk_text`] for callers that only need the text.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let params = ChunkParams::new(chunk_size, overlap)?;
    Ok(chunk_text("", text, &params)
        .into_iter()
        .map(|c| c.text)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(size, overlap).unwrap()
    }

    #[test]
    fn test_thousand_chars_three_chunks() {
        let text: String = (0..1000).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunks = chunk_text("doc", &text, &params(512, 50));
        let ranges: Vec<_> = chunks.iter().map(|c| c.byte_range.clone()).collect();
        assert_eq!(ranges, vec![0..512, 462..974, 924..1000]);
        assert_eq!(chunks[2].text.len(), 76);
        assert_eq!(&chunks[1].text[..50], &chunks[0].text[462..]);
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_text("doc", "", &params(10, 2)).is_empty());
        assert!(chunk("", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("doc", "hello", &params(512, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!(chunks[0].byte_range, 0..5);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(matches!(
            ChunkParams::new(10, 10),
            Err(Error::Config {
                parameter: "overlap",
                ..
            })
        ));
        assert!(ChunkParams::new(10, 11).is_err());
        assert!(matches!(
            ChunkParams::new(0, 0),
            Err(Error::Config {
                parameter: "chunk_size",
                ..
            })
        ));
        assert!(chunk("abc", 3, 5).is_err());
    }

    #[test]
    fn test_count_formula_and_coverage() {
        for len in [1usize, 7, 10, 11, 19, 20, 21, 57, 100, 333] {
            for (size, overlap) in [(10usize, 0usize), (10, 3), (10, 9), (7, 2)] {
                let text = "z".repeat(len);
                let p = params(size, overlap);
                let chunks = chunk_text("doc", &text, &p);

                let expected = if len <= size {
                    1
                } else {
                    (len - overlap).div_ceil(p.stride())
                };
                assert_eq!(chunks.len(), expected, "len={} size={} overlap={}", len, size, overlap);

                // No gaps: each chunk starts at or before the previous end.
                let mut covered = 0usize;
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.chunk_index, i);
                    assert_eq!(c.byte_range.start, i * p.stride());
                    assert!(c.byte_range.start <= covered);
                    covered = c.byte_range.end;
                }
                assert_eq!(covered, len);
            }
        }
    }

    #[test]
    fn test_multibyte_chars_counted_as_chars() {
        let text = "长款羽绒服白鸭绒填充";
        let chunks = chunk_text("doc", text, &params(4, 1));
        assert_eq!(chunks[0].text, "长款羽绒");
        assert_eq!(chunks[1].text, "绒服白鸭");
        for c in &chunks {
            assert_eq!(&text[c.byte_range.clone()], c.text);
        }
        assert!(chunks.last().unwrap().text.ends_with('充'));
    }

    #[test]
    fn test_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog.".repeat(20);
        let a = chunk_text("doc", &text, &params(64, 8));
        let b = chunk_text("doc", &text, &params(64, 8));
        assert_eq!(a, b);
    }
}
