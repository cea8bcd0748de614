//! Tokenizer and Okapi BM25 shared by the store implementations.
//!
//! IDF uses the `ln(1 + (N - df + 0.5) / (df + 0.5))` form, which stays
//! positive even when a term occurs in every document.

use std::collections::HashMap;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

/// Lowercase alphanumeric tokens; CJK ideographs are one token each.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(ch.to_string());
        } else if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}

/// BM25 score of `query` against each text, keyed by position.
///
/// `None` entries (documents without text) are not part of the corpus.
/// Only positions with a positive score are returned.
pub fn bm25_scores(texts: &[Option<&str>], query: &str) -> HashMap<usize, f64> {
    let mut terms = tokenize(query);
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return HashMap::new();
    }

    let tokenized: Vec<(usize, Vec<String>)> = texts
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|t| (i, tokenize(t))))
        .collect();
    let n = tokenized.len() as f64;
    if n == 0.0 {
        return HashMap::new();
    }
    let avgdl = tokenized.iter().map(|(_, t)| t.len()).sum::<usize>() as f64 / n;

    let df: HashMap<&str, usize> = terms
        .iter()
        .map(|term| {
            let count = tokenized
                .iter()
                .filter(|(_, toks)| toks.iter().any(|t| t == term))
                .count();
            (term.as_str(), count)
        })
        .collect();

    let mut scores = HashMap::new();
    for (pos, toks) in &tokenized {
        let dl = toks.len() as f64;
        let mut score = 0.0;
        for term in &terms {
            let tf = toks.iter().filter(|t| *t == term).count() as f64;
            if tf == 0.0 {
                continue;
            }
            let df = df[term.as_str()] as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            let norm = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
            score += idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm));
        }
        if score > 0.0 {
            scores.insert(*pos, score);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Down-Jacket, 90%!"), vec!["down", "jacket", "90"]);
        assert_eq!(tokenize("白鸭绒 fill"), vec!["白", "鸭", "绒", "fill"]);
    }

    #[test]
    fn test_bm25_prefers_rarer_terms() {
        let texts = [
            Some("jacket jacket coat"),
            Some("coat scarf"),
            None,
            Some("scarf gloves"),
        ];
        let scores = bm25_scores(&texts, "jacket");
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key(&0));
        assert!(bm25_scores(&texts, "!!!").is_empty());
    }

    #[test]
    fn test_bm25_term_in_every_document_still_scores() {
        let texts = [Some("long down jacket"), Some("short jacket")];
        let scores = bm25_scores(&texts, "jacket");
        assert_eq!(scores.len(), 2);
        assert!(scores[&0] > 0.1);
        // Shorter document wins on length normalization.
        assert!(scores[&1] > scores[&0]);
    }

    #[test]
    fn test_bm25_cjk_query() {
        let texts = [Some("商品A：长款羽绒服，白鸭绒填充"), Some("cotton socks")];
        let scores = bm25_scores(&texts, "羽绒服");
        assert_eq!(scores.keys().collect::<Vec<_>>(), vec![&0]);
    }
}
