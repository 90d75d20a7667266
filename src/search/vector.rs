use crate::store::DocumentStore;

/// A vector hit: document id plus a cosine similarity, optionally scaled
/// from [-1,1] into [0,1].
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
}

/// Brute-force nearest-neighbour search over the store's embeddings.
///
/// The query embedding must come from the same model that embedded the
/// documents; a mismatched model silently degrades relevance rather than
/// failing. Documents without an embedding are skipped.
pub fn search(
    store: &DocumentStore,
    query_embedding: &[f32],
    top_k: usize,
    scale: bool,
) -> Vec<VectorHit> {
    if top_k == 0 || query_embedding.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<VectorHit> = Vec::new();
    store.for_each(|doc| {
        if let Some(embedding) = &doc.embedding {
            let cos = cosine_similarity(query_embedding, embedding);
            let score = if scale { (cos + 1.0) / 2.0 } else { cos };
            scored.push(VectorHit {
                id: doc.id.clone(),
                score,
            });
        }
    });

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
