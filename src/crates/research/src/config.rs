//! Process-wide configuration for the research service.
//!
//! Follows `tooling::config::ConfigBuilder` (`from_env`/`validate`/`merge`),
//! the same pattern used elsewhere in the workspace for typed, environment
//! driven configuration.

use std::time::Duration;
use tooling::config::{get_env_bool, get_env_or, get_env_parse_or, ConfigBuilder};

/// Tunables for the research service, covering every fixed invariant named
/// in spec §5 ("Backpressure") plus provider selection.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Default cap on refinement iterations (spec §4.2 default 2).
    pub max_iterations: u32,
    /// Default critic timeout window (spec §4.7, 20-30s).
    pub critic_timeout: Duration,
    /// Per-agent memory window size (spec §4.2, default 10).
    pub memory_window: usize,
    /// Embedding batch size (spec §5, fixed invariant).
    pub embedding_batch_size: usize,
    /// Vector upsert batch size (spec §5, fixed invariant).
    pub vector_upsert_batch_size: usize,
    /// Retrieval prefetch multiplier applied to `top_k` (spec §5, fixed at 3).
    pub prefetch_multiplier: usize,
    /// RRF fusion constant (spec GLOSSARY, fixed at 60).
    pub rrf_k: f64,
    /// Default number of web results returned (spec §4.5, default 5).
    pub max_web_results: usize,
    /// Whether query rewriting is enabled by default for retrieval (spec §4.4).
    pub rewrite_query_default: bool,
    /// Outbound event stream channel capacity (spec §5, "bounded").
    pub event_channel_capacity: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            critic_timeout: Duration::from_secs(25),
            memory_window: 10,
            embedding_batch_size: 100,
            vector_upsert_batch_size: 50,
            prefetch_multiplier: 3,
            rrf_k: 60.0,
            max_web_results: 5,
            rewrite_query_default: true,
            event_channel_capacity: 256,
        }
    }
}

impl ConfigBuilder for ResearchConfig {
    fn validate(&self) -> tooling::Result<()> {
        if self.max_iterations == 0 {
            return Err(tooling::ToolingError::General(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.prefetch_multiplier == 0 {
            return Err(tooling::ToolingError::General(
                "prefetch_multiplier must be non-zero".into(),
            ));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> tooling::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_iterations: get_env_parse_or(
                &format!("{prefix}MAX_ITERATIONS"),
                defaults.max_iterations,
            )?,
            critic_timeout: Duration::from_secs(get_env_parse_or(
                &format!("{prefix}CRITIC_TIMEOUT_SECS"),
                defaults.critic_timeout.as_secs(),
            )?),
            memory_window: get_env_parse_or(
                &format!("{prefix}MEMORY_WINDOW"),
                defaults.memory_window,
            )?,
            embedding_batch_size: get_env_parse_or(
                &format!("{prefix}EMBEDDING_BATCH_SIZE"),
                defaults.embedding_batch_size,
            )?,
            vector_upsert_batch_size: get_env_parse_or(
                &format!("{prefix}VECTOR_UPSERT_BATCH_SIZE"),
                defaults.vector_upsert_batch_size,
            )?,
            prefetch_multiplier: get_env_parse_or(
                &format!("{prefix}PREFETCH_MULTIPLIER"),
                defaults.prefetch_multiplier,
            )?,
            rrf_k: get_env_parse_or(&format!("{prefix}RRF_K"), defaults.rrf_k)?,
            max_web_results: get_env_parse_or(
                &format!("{prefix}MAX_WEB_RESULTS"),
                defaults.max_web_results,
            )?,
            rewrite_query_default: get_env_bool(&format!("{prefix}REWRITE_QUERY"))?
                .unwrap_or(defaults.rewrite_query_default),
            event_channel_capacity: get_env_parse_or(
                &format!("{prefix}EVENT_CHANNEL_CAPACITY"),
                defaults.event_channel_capacity,
            )?,
        })
    }

    fn merge(&mut self, other: Self) -> &mut Self {
        *self = other;
        self
    }
}

/// Provider/connection configuration for external collaborators. These are
/// narrow interfaces per spec §1/§6 — the core only needs URLs/keys, not
/// provider-specific knobs.
#[derive(Debug, Clone, Default)]
pub struct ExternalEndpoints {
    pub vector_index_url: Option<String>,
    pub vector_collection: String,
    pub web_search_api_key: Option<String>,
}

impl ExternalEndpoints {
    pub fn from_env(prefix: &str) -> tooling::Result<Self> {
        Ok(Self {
            vector_index_url: get_env_or(&format!("{prefix}VECTOR_INDEX_URL"), "").ok(),
            vector_collection: get_env_or(&format!("{prefix}VECTOR_COLLECTION"), "documents")?,
            web_search_api_key: get_env_or(&format!("{prefix}WEB_SEARCH_API_KEY"), "").ok(),
        })
    }
}
