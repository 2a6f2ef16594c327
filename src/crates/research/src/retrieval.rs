//! C3 — Triple-Hybrid Retrieval Engine: query rewriting, parallel embedding
//! generation, dense+sparse prefetch, Reciprocal Rank Fusion, ranked chunks
//! (spec §4.4).

use crate::error::Result;
use crate::gateway::Gateway;
use crate::state::InternalSource;
use crate::vector::{VectorFilter, VectorHit, VectorIndexClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tunables the retrieval engine needs, mirroring `ResearchConfig`'s fixed
/// invariants (spec §5).
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub prefetch_multiplier: usize,
    pub rrf_k: f64,
    pub rewrite_query: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 8,
            prefetch_multiplier: 3,
            rrf_k: 60.0,
            rewrite_query: true,
        }
    }
}

pub struct RetrievalEngine {
    gateway: Arc<dyn Gateway>,
    index: Arc<dyn VectorIndexClient>,
}

impl RetrievalEngine {
    pub fn new(gateway: Arc<dyn Gateway>, index: Arc<dyn VectorIndexClient>) -> Self {
        Self { gateway, index }
    }

    /// `(query, user_id, top_k, document_ids?, rewrite_query) -> ranked list<InternalSource>`
    /// (spec §4.4 contract). `memory_note` is this chat's prior-relevant-docs
    /// recollection (spec §4.9), folded into the query rewrite when present.
    pub async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        document_ids: Option<Vec<String>>,
        params: &RetrievalParams,
        memory_note: &str,
    ) -> Result<Vec<InternalSource>> {
        let effective_query = if params.rewrite_query {
            self.rewrite_query(query, memory_note).await
        } else {
            query.to_string()
        };

        let (dense_vec, sparse_vec, _late_interaction) = tokio::try_join!(
            self.dense_embedding(&effective_query),
            self.sparse_embedding(&effective_query),
            self.late_interaction_embedding(&effective_query),
        )?;

        let filter = VectorFilter {
            user_id: user_id.to_string(),
            document_ids,
        };
        let prefetch_limit = params.top_k * params.prefetch_multiplier;

        let (dense_hits, sparse_hits) = tokio::try_join!(
            self.index.prefetch_dense(&dense_vec, &filter, prefetch_limit),
            self.index.prefetch_sparse(&sparse_vec, &filter, prefetch_limit),
        )?;

        let fused = fuse_rrf(&[("dense", &dense_hits), ("sparse", &sparse_hits)], params.rrf_k);

        let mut sources: Vec<InternalSource> = fused
            .into_iter()
            .take(params.top_k)
            .map(|r| InternalSource {
                chunk_id: r.chunk_id,
                document_id: r.document_id,
                content: r.content,
                score: r.rrf_score,
                dense_score: r.dense_score,
                sparse_score: r.sparse_score,
                metadata: r.metadata,
            })
            .collect();

        // Tie-break: (rrf_score desc, chunk_id asc) — stable given fuse_rrf
        // already sorts this way, re-assert here so callers relying only on
        // this module's output get the documented order even if fusion's
        // internal sort ever changes.
        sources.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });

        Ok(sources)
    }

    /// Transform a conversational query into a retrieval-optimized one
    /// (spec §4.4 step 1). Never returns an empty string.
    async fn rewrite_query(&self, query: &str, memory_note: &str) -> String {
        let prompt = if memory_note.is_empty() {
            format!(
                "Rewrite this query for document retrieval. Keep it under 20 words, \
                 expand pronouns to their referents, and keep named entities intact. \
                 Return only the rewritten query.\n\nQuery: {query}"
            )
        } else {
            format!(
                "Rewrite this query for document retrieval. Keep it under 20 words, \
                 expand pronouns to their referents, and keep named entities intact. \
                 Return only the rewritten query.\n\nQuery: {query}\n\nMemory note: {memory_note}"
            )
        };
        match self.gateway.generate(&prompt, None, 64).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
            Ok(_) => {
                warn!("query rewrite returned empty output, falling back to original query");
                query.to_string()
            }
            Err(e) => {
                warn!(error = %e, "query rewrite failed, falling back to original query");
                query.to_string()
            }
        }
    }

    async fn dense_embedding(&self, query: &str) -> Result<Vec<f32>> {
        self.gateway.embed(query).await
    }

    /// Local BM25-style sparse vectorizer. CPU-bound, dispatched to the
    /// blocking pool so the event loop is never blocked (spec §5).
    async fn sparse_embedding(&self, query: &str) -> Result<Vec<(u32, f32)>> {
        let query = query.to_string();
        let postings = tokio::task::spawn_blocking(move || bm25_vectorize(&query))
            .await
            .map_err(|e| crate::error::ResearchError::Graph(e.to_string()))?;
        Ok(postings)
    }

    /// Local late-interaction (token-level multi-vector) encoder. CPU-bound,
    /// dispatched to the blocking pool (spec §5). Computed per spec §4.4
    /// step 2 but, per spec's 5-step fusion algorithm, not itself an input
    /// to RRF — only dense and sparse are fused there.
    async fn late_interaction_embedding(&self, query: &str) -> Result<Vec<Vec<f32>>> {
        let query = query.to_string();
        let vecs = tokio::task::spawn_blocking(move || late_interaction_vectorize(&query))
            .await
            .map_err(|e| crate::error::ResearchError::Graph(e.to_string()))?;
        Ok(vecs)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn term_id(term: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for b in term.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// A minimal BM25-flavored term-frequency sparse vector: (term_id, tf) pairs.
fn bm25_vectorize(text: &str) -> Vec<(u32, f32)> {
    let mut counts: HashMap<u32, f32> = HashMap::new();
    for term in tokenize(text) {
        *counts.entry(term_id(&term)).or_insert(0.0) += 1.0;
    }
    counts.into_iter().collect()
}

/// One small embedding per token, standing in for a real late-interaction
/// (ColBERT-style) encoder.
fn late_interaction_vectorize(text: &str) -> Vec<Vec<f32>> {
    tokenize(text)
        .into_iter()
        .map(|term| {
            let id = term_id(&term) as f32;
            vec![(id % 997.0) / 997.0, (id % 101.0) / 101.0]
        })
        .collect()
}

/// A fused retrieval result before being converted to an `InternalSource`.
struct FusedResult {
    chunk_id: String,
    document_id: String,
    content: String,
    metadata: HashMap<String, serde_json::Value>,
    rrf_score: f64,
    dense_score: Option<f64>,
    sparse_score: Option<f64>,
}

/// Reciprocal Rank Fusion (spec GLOSSARY/§4.4 step 5): for each item
/// appearing at 1-based rank `r` in list `i`, accumulate `1/(K+r)`. Sort
/// descending, tie-break by chunk_id ascending for determinism
/// (Testable Property 6).
fn fuse_rrf(lists: &[(&str, &[VectorHit])], k: f64) -> Vec<FusedResult> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut dense_scores: HashMap<String, f64> = HashMap::new();
    let mut sparse_scores: HashMap<String, f64> = HashMap::new();
    let mut meta: HashMap<String, (&VectorHit, &'static str)> = HashMap::new();

    for (label, hits) in lists {
        for (idx, hit) in hits.iter().enumerate() {
            let rank = idx + 1;
            let contribution = 1.0 / (k + rank as f64);
            *scores.entry(hit.chunk_id.clone()).or_insert(0.0) += contribution;
            match *label {
                "dense" => {
                    dense_scores.insert(hit.chunk_id.clone(), hit.score);
                }
                "sparse" => {
                    sparse_scores.insert(hit.chunk_id.clone(), hit.score);
                }
                _ => {}
            }
            meta.entry(hit.chunk_id.clone())
                .or_insert((hit, if *label == "dense" { "dense" } else { "sparse" }));
        }
    }

    let mut results: Vec<FusedResult> = scores
        .into_iter()
        .map(|(chunk_id, rrf_score)| {
            let (hit, _) = meta.get(&chunk_id).expect("chunk present in meta");
            FusedResult {
                chunk_id: chunk_id.clone(),
                document_id: hit.document_id.clone(),
                content: hit.content.clone(),
                metadata: hit.metadata.clone(),
                rrf_score,
                dense_score: dense_scores.get(&chunk_id).copied(),
                sparse_score: sparse_scores.get(&chunk_id).copied(),
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    debug!(fused = results.len(), "RRF fusion complete");
    results
}
