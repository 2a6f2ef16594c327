//! C5 — Memory Store: namespaced episodic/semantic memory with similarity
//! or recency search, plus the four per-agent prompt formatters (spec §4.9,
//! SPEC_FULL.md §C.2).

use crate::error::Result;
use crate::gateway::Gateway;
use crate::state::Memory;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// `(user_id, chat_id, kind, agent_name)` for episodic memory;
/// `agent_name` is ignored (pass `""`) for the per-chat semantic namespace
/// (spec §4.9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryNamespace {
    pub user_id: String,
    pub chat_id: String,
    pub kind: MemoryKind,
    pub agent_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Episodic,
    Semantic,
}

impl MemoryNamespace {
    pub fn episodic(user_id: &str, chat_id: &str, agent_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            chat_id: chat_id.to_string(),
            kind: MemoryKind::Episodic,
            agent_name: agent_name.to_string(),
        }
    }

    pub fn semantic(user_id: &str, chat_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            chat_id: chat_id.to_string(),
            kind: MemoryKind::Semantic,
            agent_name: String::new(),
        }
    }
}

/// The memory store collaborator (C5). Implementations are process-wide
/// singletons (spec §5 "Shared resources").
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn put(&self, namespace: &MemoryNamespace, key: &str, value: Value) -> Result<()>;

    /// Ordered by vector similarity to `query` when given, else by recency
    /// (most recent first), capped at `limit` (spec §4.9).
    async fn search(
        &self,
        namespace: &MemoryNamespace,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>>;
}

struct StoredItem {
    key: String,
    value: Value,
    created_at: chrono::DateTime<Utc>,
    embedding: Option<Vec<f32>>,
}

/// Ephemeral in-process store (spec §4.9 "Lifecycle": ephemeral to the
/// process unless an external store is wired through the same interface).
pub struct InMemoryMemoryStore {
    items: RwLock<HashMap<MemoryNamespace, Vec<StoredItem>>>,
    gateway: std::sync::Arc<dyn Gateway>,
}

impl InMemoryMemoryStore {
    pub fn new(gateway: std::sync::Arc<dyn Gateway>) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            gateway,
        }
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

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, namespace: &MemoryNamespace, key: &str, value: Value) -> Result<()> {
        let embedding = if let Value::String(s) = &value {
            self.gateway.embed(s).await.ok()
        } else {
            None
        };
        let mut items = self.items.write().unwrap();
        let bucket = items.entry(namespace.clone()).or_default();
        bucket.retain(|i| i.key != key);
        bucket.push(StoredItem {
            key: key.to_string(),
            value,
            created_at: Utc::now(),
            embedding,
        });
        Ok(())
    }

    async fn search(
        &self,
        namespace: &MemoryNamespace,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>> {
        let bucket: Vec<StoredItemOwned> = {
            let items = self.items.read().unwrap();
            items
                .get(namespace)
                .map(|v| {
                    v.iter()
                        .map(|i| StoredItemOwned {
                            key: i.key.clone(),
                            value: i.value.clone(),
                            created_at: i.created_at,
                            embedding: i.embedding.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let ordered = match query {
            Some(q) => {
                let query_embedding = self.gateway.embed(q).await.ok();
                let mut scored: Vec<(f64, StoredItemOwned)> = bucket
                    .into_iter()
                    .map(|i| {
                        let score = match (&query_embedding, &i.embedding) {
                            (Some(qe), Some(ie)) => cosine(qe, ie),
                            _ => 0.0,
                        };
                        (score, i)
                    })
                    .collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.into_iter().map(|(_, i)| i).collect::<Vec<_>>()
            }
            None => {
                let mut by_recency = bucket;
                by_recency.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                by_recency
            }
        };

        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|i| Memory {
                key: i.key,
                value: i.value,
                created_at: i.created_at,
            })
            .collect())
    }
}

#[derive(Clone)]
struct StoredItemOwned {
    key: String,
    value: Value,
    created_at: chrono::DateTime<Utc>,
    embedding: Option<Vec<f32>>,
}

/// Empty memory yields an empty string, for every formatter below
/// (spec §4.9).
fn empty_or<F: FnOnce(&[Memory]) -> String>(items: &[Memory], f: F) -> String {
    if items.is_empty() {
        String::new()
    } else {
        f(items)
    }
}

/// Planner memory: a bulleted list of recent subtasks (SPEC_FULL.md §C.2).
pub fn format_planner_memory(items: &[Memory]) -> String {
    empty_or(items, |items| {
        items
            .iter()
            .filter_map(|m| m.value.as_str().map(|s| format!("- {s}")))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

/// Retrieval memory: "previously relevant: <doc ids>" (SPEC_FULL.md §C.2).
pub fn format_retrieval_memory(items: &[Memory]) -> String {
    empty_or(items, |items| {
        let ids: Vec<String> = items
            .iter()
            .filter_map(|m| m.value.as_str().map(|s| s.to_string()))
            .collect();
        format!("previously relevant: {}", ids.join(", "))
    })
}

/// Synthesis memory: the most recent answer's first ~200 chars
/// (SPEC_FULL.md §C.2).
pub fn format_synthesis_memory(items: &[Memory]) -> String {
    empty_or(items, |items| {
        let latest = &items[0];
        let text = latest.value.as_str().unwrap_or_default();
        text.chars().take(200).collect()
    })
}

/// Critic memory: a running-average confidence label (SPEC_FULL.md §C.2).
pub fn format_critic_memory(items: &[Memory]) -> String {
    empty_or(items, |items| {
        let scores: Vec<f64> = items.iter().filter_map(|m| m.value.as_f64()).collect();
        if scores.is_empty() {
            return String::new();
        }
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;
        let label = if avg >= 0.7 {
            "mostly verified"
        } else if avg >= 0.4 {
            "mixed"
        } else {
            "mostly unsupported"
        };
        label.to_string()
    })
}
