//! An in-memory `VectorIndexClient` for tests, standing in for a real
//! multi-vector store (Qdrant et al., out of scope per spec §1).

use super::{VectorFilter, VectorHit, VectorIndexClient, VectorPoint};
use crate::error::Result;
use std::sync::RwLock;

pub struct InMemoryVectorIndex {
    points: RwLock<Vec<VectorPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        (dot / (na * nb)) as f64
    }
}

fn sparse_overlap(a: &[(u32, f32)], b: &[(u32, f32)]) -> f64 {
    let mut score = 0.0f64;
    for &(term, weight) in a {
        if let Some(&(_, other_weight)) = b.iter().find(|(t, _)| *t == term) {
            score += (weight * other_weight) as f64;
        }
    }
    score
}

impl InMemoryVectorIndex {
    fn filtered<'a>(
        &self,
        points: &'a [VectorPoint],
        filter: &VectorFilter,
    ) -> Vec<&'a VectorPoint> {
        points
            .iter()
            .filter(|p| p.user_id == filter.user_id)
            .filter(|p| {
                filter
                    .document_ids
                    .as_ref()
                    .map(|docs| docs.contains(&p.document_id))
                    .unwrap_or(true)
            })
            .collect()
    }
}

fn rank_and_truncate(mut scored: Vec<VectorHit>, limit: usize) -> Vec<VectorHit> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    scored.truncate(limit);
    scored
}

#[async_trait::async_trait]
impl VectorIndexClient for InMemoryVectorIndex {
    async fn prefetch_dense(
        &self,
        vector: &[f32],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let points = self.points.read().unwrap();
        let scored = self
            .filtered(&points, filter)
            .into_iter()
            .map(|p| VectorHit {
                chunk_id: p.chunk_id.clone(),
                document_id: p.document_id.clone(),
                content: p.content.clone(),
                metadata: p.metadata.clone(),
                score: cosine(vector, &p.dense),
            })
            .collect();
        Ok(rank_and_truncate(scored, limit))
    }

    async fn prefetch_sparse(
        &self,
        sparse: &[(u32, f32)],
        filter: &VectorFilter,
        limit: usize,
    ) -> Result<Vec<VectorHit>> {
        let points = self.points.read().unwrap();
        let scored = self
            .filtered(&points, filter)
            .into_iter()
            .map(|p| VectorHit {
                chunk_id: p.chunk_id.clone(),
                document_id: p.document_id.clone(),
                content: p.content.clone(),
                metadata: p.metadata.clone(),
                score: sparse_overlap(sparse, &p.sparse),
            })
            .collect();
        Ok(rank_and_truncate(scored, limit))
    }

    async fn upsert(&self, points: Vec<VectorPoint>) -> Result<()> {
        let mut store = self.points.write().unwrap();
        for point in points {
            store.retain(|p| p.chunk_id != point.chunk_id);
            store.push(point);
        }
        Ok(())
    }
}
