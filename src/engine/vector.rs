//! PALIMPSEST - Vector Similarity
//! Cosine distance over `f32` vectors, a deterministic text embedder, and
//! top-k ranking used by similarity reads.
//!
//! ## Embedding
//! Text is lowercased and split on non-alphanumeric characters. Each token
//! is hashed with CRC32 into one of `EMBED_DIMS` buckets (hashed bag of
//! words). Texts sharing words point in similar directions.

use std::cmp::Ordering;

/// Dimension of vectors produced by `embed_text`.
pub const EMBED_DIMS: usize = 64;

/// Dot product over the common prefix of `a` and `b`.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity cos(a,b) = dot(a,b) / (‖a‖·‖b‖).
/// Returns 0.0 if either vector is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = inner_product(a, b);
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Cosine distance = 1 − cosine_similarity. Ranges over `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Hashed bag-of-words embedding of `text`.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; EMBED_DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let bucket = crc32fast::hash(token.as_bytes()) as usize % EMBED_DIMS;
        vector[bucket] += 1.0;
    }
    vector
}

/// Keep the `k` smallest distances, ascending. Ties keep input order.
pub fn top_k_by_distance<T>(mut scored: Vec<(T, f32)>, k: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    scored.truncate(k);
    scored
}
