//! C2 — Vector Index Client: a multi-vector collection (dense, sparse,
//! late-interaction) with filtered query and upsert, and payload indexes on
//! tenant and document keys (spec §4.4 "Indexing (reverse path)", §6).

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// One of the three co-located named vector slots on a point (spec §6).
#[derive(Debug, Clone)]
pub enum NamedVector {
    /// 3072-d cosine.
    Dense(Vec<f32>),
    /// Sparse BM25 postings: (term_id, weight).
    Sparse(Vec<(u32, f32)>),
    /// 128-d multi-vector, MAX_SIM comparator (late interaction).
    LateInteraction(Vec<Vec<f32>>),
}

/// A point to upsert: a chunk with its three vectors and payload
/// (spec §4.4 "each chunk becomes a point with three co-located vectors").
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk_id: String,
    pub document_id: String,
    pub user_id: String,
    pub content: String,
    pub filename: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub dense: Vec<f32>,
    pub sparse: Vec<(u32, f32)>,
    pub late_interaction: Vec<Vec<f32>>,
}

/// Filter applied at query time: always `user_id = :u`, optionally
/// `document_id ∈ :docs` (spec §4.4 step 3, tenant isolation invariant).
#[derive(Debug, Clone)]
pub struct VectorFilter {
    pub user_id: String,
    pub document_ids: Option<Vec<String>>,
}

/// A single ranked hit from a prefetch query, before RRF fusion.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub score: f64,
}

/// The multi-vector collection client (C2). Implementations are process-wide
/// singletons (spec §5 "Shared resources").
#[async_trait]
pub trait VectorIndexClient: Send + Sync {
    /// Dense (cosine) prefetch query, returning up to `limit` hits.
    async fn prefetch_dense(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;

    /// Sparse (BM25) prefetch query, returning up to `limit` hits.
    async fn prefetch_sparse(
        &self,
        sparse: &[(u32, f32)],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<VectorHit>>;

    /// Upsert points in batches (default batch size is a caller concern —
    /// spec §5 fixes it at 50; this call upserts exactly what it is given).
    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()>;
}
