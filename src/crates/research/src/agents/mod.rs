//! The four graph nodes (C6-C9): planner, synthesis, critic, image-gen.
//!
//! Each module exposes a plain async function of `(ResearchState, &AgentDeps)
//! -> Result<Value>` that the orchestrator wires into a `research::graph`
//! node closure — the closures own the `Arc` clones, the functions stay free
//! of graph-engine types so they can be unit tested directly against a state
//! value.

pub mod critic;
pub mod image_gen;
pub mod planner;
pub mod synthesis;

use crate::gateway::Gateway;
use crate::memory_store::MemoryStore;
use crate::persistence::ObjectStorage;
use crate::vector::VectorIndexClient;
use crate::web_search::WebSearchProvider;
use std::sync::Arc;

/// Shared collaborators every agent needs, grouped so the orchestrator can
/// build one `Arc<AgentDeps>` per session and clone it cheaply into each
/// node closure (spec §5 "Shared resources" — providers are process-wide
/// singletons; sessions only hold `Arc` handles to them).
pub struct AgentDeps {
    pub gateway: Arc<dyn Gateway>,
    pub vector_index: Arc<dyn VectorIndexClient>,
    pub web_search: Arc<dyn WebSearchProvider>,
    pub memory: Arc<dyn MemoryStore>,
    pub object_storage: Arc<dyn ObjectStorage>,
    pub config: crate::config::ResearchConfig,
}
