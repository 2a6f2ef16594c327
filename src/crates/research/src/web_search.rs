//! C4 — Web Search Client: query expansion, parallel provider search,
//! dedup, composite re-ranking, optional quick-answer passthrough
//! (spec §4.5, SPEC_FULL.md §C.1).

use crate::error::{Result, WebSearchError};
use crate::gateway::Gateway;
use crate::json_recovery::recover_json;
use crate::state::WebSource;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// A single provider result, before composite re-ranking.
#[derive(Debug, Clone)]
pub struct RawWebResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub raw_content: Option<String>,
    pub published_date: Option<chrono::DateTime<Utc>>,
    pub score: f64,
}

/// The external search provider (Tavily-shaped; out of scope to implement a
/// real HTTP client against it per spec §1 — callers inject an
/// implementation).
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawWebResult>>;
    /// A provider-computed instant answer, when the query looks factual.
    async fn quick_answer(&self, query: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct QueryExpansion {
    primary_query: String,
    #[serde(default)]
    alternative_queries: Vec<String>,
    #[serde(default)]
    query_type: Option<String>,
}

pub struct WebSearchEngine {
    gateway: Arc<dyn Gateway>,
    provider: Arc<dyn WebSearchProvider>,
}

pub struct WebSearchOutcome {
    pub sources: Vec<WebSource>,
    pub quick_answer: Option<String>,
}

impl WebSearchEngine {
    pub fn new(gateway: Arc<dyn Gateway>, provider: Arc<dyn WebSearchProvider>) -> Self {
        Self { gateway, provider }
    }

    /// `(query, max_results) -> {sources, quick_answer?}` (spec §4.5).
    pub async fn search(&self, query: &str, max_results: usize) -> Result<WebSearchOutcome> {
        let expansion = self.expand_query(query).await;

        let mut queries = vec![expansion.primary_query.clone()];
        queries.extend(expansion.alternative_queries.iter().cloned());
        queries.truncate(3);

        let is_temporal = matches!(expansion.query_type.as_deref(), Some("temporal"));

        let searches = futures::future::join_all(
            queries.iter().map(|q| self.provider.search(q, max_results)),
        )
        .await;

        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut merged: Vec<RawWebResult> = Vec::new();
        for outcome in searches {
            match outcome {
                Ok(results) => {
                    for r in results {
                        if seen_urls.insert(r.url.clone()) {
                            merged.push(r);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "a web search query failed, continuing with the rest"),
            }
        }

        if merged.is_empty() {
            return Err(WebSearchError::NoResults.into());
        }

        let mut sources: Vec<WebSource> = merged
            .into_iter()
            .map(|r| {
                let relevance_score = composite_score(&r, is_temporal);
                WebSource {
                    url: r.url,
                    title: r.title,
                    content: r.content,
                    raw_content: r.raw_content,
                    published_date: r.published_date,
                    score: r.score,
                    relevance_score,
                }
            })
            .collect();

        sources.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sources.truncate(max_results);

        let quick_answer = self.provider.quick_answer(&expansion.primary_query).await.ok().flatten();

        Ok(WebSearchOutcome { sources, quick_answer })
    }

    /// Expand the query into a primary search string plus up to two
    /// alternatives and a type hint (spec §C.1 supplement). Falls back to a
    /// single unexpanded query when the LLM output doesn't parse.
    async fn expand_query(&self, query: &str) -> QueryExpansion {
        let prompt = format!(
            "Expand this search query into a JSON object with fields \
             `primary_query` (string), `alternative_queries` (array of up to \
             2 strings), and `query_type` (one of \"factual\", \"temporal\", \
             \"comparative\", \"general\"). Query: {query}"
        );
        let raw = match self.gateway.generate_json(&prompt, None, 0.3, Some(256)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "query expansion request failed, using the raw query");
                return QueryExpansion {
                    primary_query: query.to_string(),
                    alternative_queries: Vec::new(),
                    query_type: None,
                };
            }
        };

        match recover_json(&raw).and_then(|v| serde_json::from_value(v).ok()) {
            Some(expansion) => expansion,
            None => {
                warn!("query expansion output was not recoverable JSON, using the raw query");
                QueryExpansion {
                    primary_query: query.to_string(),
                    alternative_queries: Vec::new(),
                    query_type: None,
                }
            }
        }
    }
}

/// `provider_score + recency_boost + content_length_boost`
/// (spec §C.1 supplement: recency_boost is 0.1 when the query is temporal
/// and the result is within 30 days; content_length_boost is
/// `min(len/2000, 0.1)`).
fn composite_score(r: &RawWebResult, is_temporal: bool) -> f64 {
    let recency_boost = if is_temporal {
        match r.published_date {
            Some(date) => {
                let age_days = (Utc::now() - date).num_days();
                if (0..=30).contains(&age_days) {
                    0.1
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    } else {
        0.0
    };

    let content_len = r.raw_content.as_ref().unwrap_or(&r.content).len() as f64;
    let content_length_boost = (content_len / 2000.0).min(0.1);

    r.score + recency_boost + content_length_boost
}
