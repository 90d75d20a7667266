//! Hybrid retrieval + rerank pipeline.
//!
//! One query fans out to the lexical (BM25) and vector retrievers, the
//! candidate lists are joined by document id, the joined set is rescored
//! from scratch by a cross-encoder, and the result is truncated to `top_k`
//! and filtered by the score cutoff. The joiner deliberately drops the
//! retriever scores: union scoring is delegated entirely to the reranker.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::llm::embeddings::Embedder;
use crate::llm::rerank::Reranker;
use crate::models::ScoredDocument;
use crate::search::bm25::Bm25Index;
use crate::search::vector;
use crate::store::DocumentStore;

/// Which stages a pipeline runs. Replaces the near-duplicate
/// hybrid/embedding-only/lexical-only constructor variants with one
/// configurable value.
#[derive(Debug, Clone, Copy)]
pub struct PipelineCaps {
    pub lexical: bool,
    pub vector: bool,
    pub rerank: bool,
}

impl PipelineCaps {
    pub fn hybrid() -> Self {
        Self {
            lexical: true,
            vector: true,
            rerank: true,
        }
    }

    pub fn lexical_only() -> Self {
        Self {
            lexical: true,
            vector: false,
            rerank: true,
        }
    }

    pub fn vector_only() -> Self {
        Self {
            lexical: false,
            vector: true,
            rerank: true,
        }
    }

    pub fn without_rerank(mut self) -> Self {
        self.rerank = false;
        self
    }
}

/// The composed retrieval pipeline. Holds read-only shared state; safe to
/// use from concurrent sessions.
pub struct RetrievalPipeline {
    store: Arc<DocumentStore>,
    bm25: Arc<Bm25Index>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    caps: PipelineCaps,
    /// Rescale retriever scores into [0,1] at the retriever boundary.
    /// Required for the rerank-disabled ordering fallback; raw scores are
    /// never compared across stages.
    scale: bool,
}

impl RetrievalPipeline {
    pub fn new(
        store: Arc<DocumentStore>,
        bm25: Arc<Bm25Index>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        caps: PipelineCaps,
    ) -> Self {
        Self {
            store,
            bm25,
            embedder,
            reranker,
            caps,
            scale: true,
        }
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Retrieve at most `top_k` documents for `query`, ordered by
    /// descending rerank score, each scoring at least `cutoff`, each
    /// distinct by id. `top_k == 0` suppresses retrieval entirely.
    ///
    /// Each retriever fetches `top_k` candidates of its own, so the joined
    /// set can hold up to twice that before the rerank cut; the
    /// oversampling is intentional, rerank quality depends on having more
    /// candidates than the final count.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        cutoff: f32,
    ) -> Result<Vec<ScoredDocument>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let (lexical_hits, vector_hits) =
            tokio::join!(self.lexical_hits(query, top_k), self.vector_hits(query, top_k));
        let lexical_hits = lexical_hits?;

        // Join by id. First-seen order, duplicate ids collapse to one
        // entry keeping the larger scaled score (only consulted when
        // reranking is off).
        let mut seen: HashSet<String> = HashSet::new();
        let mut joined: Vec<(String, f32)> = Vec::new();
        for (id, score) in lexical_hits.into_iter().chain(vector_hits) {
            if seen.insert(id.clone()) {
                joined.push((id, score));
            } else if let Some(entry) = joined.iter_mut().find(|(j, _)| *j == id) {
                entry.1 = entry.1.max(score);
            }
        }

        // Resolve candidates in the store; every document surfaced to the
        // reranker must be resolvable.
        let mut candidates: Vec<ScoredDocument> = joined
            .into_iter()
            .filter_map(|(id, score)| {
                self.store.get(&id).map(|doc| ScoredDocument { doc, score })
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if self.caps.rerank {
            if let Some(reranker) = &self.reranker {
                match self.rescore(reranker.as_ref(), query, &candidates).await {
                    Ok(rescored) => candidates = rescored,
                    Err(e) => {
                        tracing::warn!("Re-ranking failed, keeping retriever order: {e}");
                    }
                }
            } else {
                tracing::debug!("No reranker configured, keeping retriever order");
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        candidates.retain(|c| c.score >= cutoff);
        Ok(candidates)
    }

    async fn lexical_hits(&self, query: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        if !self.caps.lexical {
            return Ok(Vec::new());
        }
        let bm25 = self.bm25.clone();
        let query = query.to_string();
        let scale = self.scale;
        let hits = tokio::task::spawn_blocking(move || bm25.search(&query, top_k, scale)).await??;
        Ok(hits.into_iter().map(|h| (h.id, h.score)).collect())
    }

    async fn vector_hits(&self, query: &str, top_k: usize) -> Vec<(String, f32)> {
        if !self.caps.vector {
            return Vec::new();
        }
        // The query must be embedded with the index-time model; a failure
        // here degrades to lexical-only rather than aborting the turn.
        match self.embedder.embed_single(query).await {
            Ok(query_embedding) => {
                vector::search(&self.store, &query_embedding, top_k, self.scale)
                    .into_iter()
                    .map(|h| (h.id, h.score))
                    .collect()
            }
            Err(e) => {
                tracing::warn!("Vector retrieval skipped: {e}");
                Vec::new()
            }
        }
    }

    /// Fresh cross-encoder score for every joined candidate, upstream
    /// scores discarded.
    async fn rescore(
        &self,
        reranker: &dyn Reranker,
        query: &str,
        candidates: &[ScoredDocument],
    ) -> Result<Vec<ScoredDocument>> {
        let texts: Vec<String> = candidates.iter().map(|c| c.doc.content.clone()).collect();
        let results = reranker.rerank(query, &texts).await?;

        let mut rescored = Vec::with_capacity(results.len());
        for r in results {
            if let Some(candidate) = candidates.get(r.index) {
                rescored.push(ScoredDocument {
                    doc: candidate.doc.clone(),
                    score: r.score,
                });
            }
        }
        Ok(rescored)
    }
}
