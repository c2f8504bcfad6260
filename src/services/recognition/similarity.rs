//! Bounded similarity scoring between face signatures.

/// Cosine similarity in [-1, 1]. Degenerate inputs (empty vectors, zero
/// norms, mismatched lengths) score 0.0 rather than erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Same-person decision at the given threshold. An absent signature on either
/// side is never a match and scores 0.0.
pub fn is_match(a: Option<&[f32]>, b: Option<&[f32]>, threshold: f32) -> (bool, f32) {
    match (a, b) {
        (Some(a), Some(b)) => {
            let similarity = cosine_similarity(a, b);
            (similarity >= threshold, similarity)
        }
        _ => (false, 0.0),
    }
}
