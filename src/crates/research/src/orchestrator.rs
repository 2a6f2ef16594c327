//! C11 — Orchestrator: drives a single research session end-to-end (spec
//! §4.2). Resolves tenant scope, injects long-term memory, builds and runs
//! the graph, translates graph events into the caller-facing stream, and
//! persists the final result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agents::{critic, image_gen, planner, synthesis, AgentDeps};
use crate::config::ResearchConfig;
use crate::error::{Result, ResearchError};
use crate::events::{ConfidenceLabel, NodeStatus, NormalizedSource, NormalizedSourceType, ResearchEvent};
use crate::gateway::Gateway;
use crate::graph::{CancellationToken, GraphBuilder, GraphEvent};
use crate::memory_store::{format_retrieval_memory, MemoryNamespace, MemoryStore};
use crate::persistence::{AgentLogEntry, ObjectStorage, SessionRecord, SessionStatus, SessionStore};
use crate::retrieval::{RetrievalEngine, RetrievalParams};
use crate::state::{CitedSource, PlanTool, ResearchState};
use crate::vector::VectorIndexClient;
use crate::web_search::{WebSearchEngine, WebSearchProvider};

/// Caller-supplied parameters for one session (spec §4.2 "Inputs").
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub user_id: String,
    pub chat_id: String,
    pub thread_id: String,
    pub use_web: bool,
    pub document_ids: Option<Vec<String>>,
    pub max_iterations: Option<u32>,
}

/// The `documents` table narrowed to what the orchestrator needs: the set
/// of document ids owned by a chat, for the tenant-isolation replacement
/// step (spec §4.2 pre-graph step 1, Testable Property 4).
#[async_trait]
pub trait DocumentRegistry: Send + Sync {
    async fn document_ids_for_chat(&self, user_id: &str, chat_id: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
pub struct InMemoryDocumentRegistry {
    by_chat: std::sync::RwLock<HashMap<(String, String), Vec<String>>>,
}

impl InMemoryDocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, chat_id: &str, document_ids: Vec<String>) {
        self.by_chat
            .write()
            .unwrap()
            .insert((user_id.to_string(), chat_id.to_string()), document_ids);
    }
}

#[async_trait]
impl DocumentRegistry for InMemoryDocumentRegistry {
    async fn document_ids_for_chat(&self, user_id: &str, chat_id: &str) -> Result<Vec<String>> {
        Ok(self
            .by_chat
            .read()
            .unwrap()
            .get(&(user_id.to_string(), chat_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Every collaborator the orchestrator needs, process-wide singletons
/// shared across sessions (spec §5 "Shared resources").
pub struct Orchestrator {
    gateway: Arc<dyn Gateway>,
    vector_index: Arc<dyn VectorIndexClient>,
    web_search: Arc<dyn WebSearchProvider>,
    memory: Arc<dyn MemoryStore>,
    session_store: Arc<dyn SessionStore>,
    object_storage: Arc<dyn ObjectStorage>,
    documents: Arc<dyn DocumentRegistry>,
    config: ResearchConfig,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        vector_index: Arc<dyn VectorIndexClient>,
        web_search: Arc<dyn WebSearchProvider>,
        memory: Arc<dyn MemoryStore>,
        session_store: Arc<dyn SessionStore>,
        object_storage: Arc<dyn ObjectStorage>,
        documents: Arc<dyn DocumentRegistry>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            gateway,
            vector_index,
            web_search,
            memory,
            session_store,
            object_storage,
            documents,
            config,
        }
    }

    /// Run one session to completion, streaming `ResearchEvent`s on
    /// `events`. Returns once the terminal `complete`/`error` event has been
    /// emitted; the caller owns stream lifetime past that point.
    pub async fn run(
        &self,
        request: ResearchRequest,
        events: mpsc::Sender<ResearchEvent>,
        cancellation: CancellationToken,
    ) -> Result<()> {
        let start = Instant::now();
        let session_id = Uuid::new_v4().to_string();
        let message_id = Uuid::new_v4().to_string();

        // Pre-graph step 1: tenant isolation always wins over a
        // caller-supplied document list (spec §4.2, Testable Property 4).
        let document_ids = match self.documents.document_ids_for_chat(&request.user_id, &request.chat_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "document registry lookup failed, scoping to no documents");
                Vec::new()
            }
        };
        if let Some(caller_ids) = &request.document_ids {
            if caller_ids.iter().any(|d| !document_ids.contains(d)) {
                warn!("caller-supplied document_ids were replaced by the chat-scoped set");
            }
        }

        let memory_context = self.load_memory_context(&request).await;

        let max_iterations = request.max_iterations.unwrap_or(self.config.max_iterations);
        let mut state = ResearchState::new(
            request.query.clone(),
            request.user_id.clone(),
            request.chat_id.clone(),
            request.thread_id.clone(),
            session_id.clone(),
            request.use_web,
            document_ids,
            max_iterations,
        );
        state.memory_context = Some(memory_context);

        let session_record = SessionRecord {
            id: session_id.clone(),
            user_id: request.user_id.clone(),
            chat_id: request.chat_id.clone(),
            thread_id: request.thread_id.clone(),
            query: request.query.clone(),
            status: SessionStatus::Running,
            result: None,
        };
        if let Err(e) = self.session_store.create_session(session_record).await {
            error!(error = %e, "failed to create session row");
            let _ = events.send(ResearchEvent::Error { message: e.to_string() }).await;
            return Err(e);
        }

        let _ = events
            .send(ResearchEvent::MessageId {
                message_id: message_id.clone(),
            })
            .await;

        match self.run_graph(state, events.clone(), cancellation).await {
            Ok(final_state) => {
                self.finish_success(&session_id, &message_id, &request, final_state, start, events)
                    .await
            }
            Err(e) => {
                self.finish_failure(&session_id, &e, events).await;
                Err(e)
            }
        }
    }

    async fn load_memory_context(&self, request: &ResearchRequest) -> HashMap<String, Vec<crate::state::Memory>> {
        let mut context = HashMap::new();
        for agent in ["planner", "retrieval", "synthesis", "critic"] {
            let namespace = MemoryNamespace::episodic(&request.user_id, &request.chat_id, agent);
            let items = self
                .memory
                .search(&namespace, Some(&request.query), self.config.memory_window)
                .await
                .unwrap_or_default();
            context.insert(agent.to_string(), items);
        }
        context
    }

    async fn run_graph(
        &self,
        state: ResearchState,
        events: mpsc::Sender<ResearchEvent>,
        cancellation: CancellationToken,
    ) -> Result<ResearchState> {
        let deps = Arc::new(AgentDeps {
            gateway: self.gateway.clone(),
            vector_index: self.vector_index.clone(),
            web_search: self.web_search.clone(),
            memory: self.memory.clone(),
            object_storage: self.object_storage.clone(),
            config: self.config.clone(),
        });
        let retrieval_engine = Arc::new(RetrievalEngine::new(self.gateway.clone(), self.vector_index.clone()));
        let web_search_engine = Arc::new(WebSearchEngine::new(self.gateway.clone(), self.web_search.clone()));
        let retrieval_params = RetrievalParams {
            top_k: 8,
            prefetch_multiplier: self.config.prefetch_multiplier,
            rrf_k: self.config.rrf_k,
            rewrite_query: self.config.rewrite_query_default,
        };
        let max_web_results = self.config.max_web_results;
        let critic_timeout = self.config.critic_timeout;

        let graph = {
            let planner_deps = deps.clone();
            let image_deps = deps.clone();
            let synthesis_deps = deps.clone();
            let critic_deps = deps;

            GraphBuilder::new(ResearchState::reducer_schema())
                .add_node("planning", move |value, _ctx| {
                    let deps = planner_deps.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        planner::run(&state, &deps).await
                    }
                })
                .add_node("retrieval", move |value, _ctx| {
                    let engine = retrieval_engine.clone();
                    let params = retrieval_params.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        run_retrieval_node(&state, &engine, &params).await
                    }
                })
                .add_node("web_search", move |value, ctx| {
                    let engine = web_search_engine.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        run_web_search_node(&state, &engine, max_web_results, &ctx).await
                    }
                })
                .add_node("image_gen", move |value, _ctx| {
                    let deps = image_deps.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        image_gen::run(&state, &deps).await
                    }
                })
                .add_node("synthesis", move |value, ctx| {
                    let deps = synthesis_deps.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        synthesis::run(&state, &deps, &ctx).await
                    }
                })
                .add_node("critic", move |value, _ctx| {
                    let deps = critic_deps.clone();
                    async move {
                        let state = ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))?;
                        run_critic_node(&state, &deps, critic_timeout).await
                    }
                })
                .set_entry("planning")
                .add_edge("planning", "retrieval")
                .add_edge("planning", "web_search")
                .add_edge("planning", "image_gen")
                .add_edge("retrieval", "synthesis")
                .add_edge("web_search", "synthesis")
                .add_edge("image_gen", "synthesis")
                .add_edge("synthesis", "critic")
                .add_conditional_edge("critic", |state| {
                    if state["needs_refinement"].as_bool().unwrap_or(false) {
                        Some("synthesis".to_string())
                    } else {
                        None
                    }
                })
                .compile()?
        };

        let (graph_tx, mut graph_rx) = mpsc::channel(self.config.event_channel_capacity);
        let translate = tokio::spawn({
            let events = events.clone();
            async move {
                while let Some(event) = graph_rx.recv().await {
                    translate_event(event, &events).await;
                }
            }
        });

        let result = graph.run(state.to_value(), graph_tx, cancellation).await;
        let _ = translate.await;

        let value = result?;
        ResearchState::from_value(value).map_err(|e| ResearchError::Graph(e.to_string()))
    }

    async fn finish_success(
        &self,
        session_id: &str,
        message_id: &str,
        request: &ResearchRequest,
        state: ResearchState,
        start: Instant,
        events: mpsc::Sender<ResearchEvent>,
    ) -> Result<()> {
        let normalized = normalize_sources(&state);
        let _ = events
            .send(ResearchEvent::Sources {
                sources: normalized.clone(),
            })
            .await;

        let answer = state.synthesis_result.as_ref().map(|r| r.answer.clone()).unwrap_or_default();
        let confidence = match &state.verification {
            Some(v) if v.verification_status == crate::state::VerificationStatus::Timeout => ConfidenceLabel::Timeout,
            _ => state
                .synthesis_result
                .as_ref()
                .map(|r| ConfidenceLabel::from(r.confidence))
                .unwrap_or(ConfidenceLabel::Low),
        };
        let total_latency_ms = start.elapsed().as_millis() as u64;

        let result_value = json!({
            "answer": answer,
            "sources": normalized,
            "verification": state.verification,
            "confidence": confidence,
            "total_latency_ms": total_latency_ms,
        });
        if let Err(e) = self.session_store.complete_session(session_id, result_value).await {
            warn!(error = %e, "failed to persist completed session");
        }

        for entry in &state.agent_timeline {
            let log = AgentLogEntry {
                session_id: session_id.to_string(),
                agent_name: entry.agent_name.clone(),
                events: serde_json::to_value(entry).unwrap_or(serde_json::Value::Null),
                latency_ms: entry.latency_ms,
            };
            if let Err(e) = self.session_store.append_agent_log(log).await {
                warn!(error = %e, agent = %entry.agent_name, "failed to append agent log");
            }
        }

        self.write_post_session_memory(request, &state, message_id).await;

        let title = crate::persistence::derive_title(&request.query);
        let _ = events
            .send(ResearchEvent::TitleUpdated {
                title,
                chat_id: request.chat_id.clone(),
            })
            .await;

        let _ = events
            .send(ResearchEvent::Complete {
                message_id: message_id.to_string(),
                confidence,
                total_latency_ms,
                sources: normalized,
                verification: state.verification.clone(),
                answer,
            })
            .await;

        info!(session_id, total_latency_ms, "research session complete");
        Ok(())
    }

    async fn finish_failure(&self, session_id: &str, error: &ResearchError, events: mpsc::Sender<ResearchEvent>) {
        if let Err(e) = self.session_store.fail_session(session_id, &error.to_string()).await {
            warn!(error = %e, "failed to mark session failed");
        }
        let _ = events
            .send(ResearchEvent::Error {
                message: error.to_string(),
            })
            .await;
    }

    async fn write_post_session_memory(&self, request: &ResearchRequest, state: &ResearchState, message_id: &str) {
        if let Some(plan) = &state.execution_plan {
            let _ = self
                .memory
                .put(
                    &MemoryNamespace::episodic(&request.user_id, &request.chat_id, "planner"),
                    message_id,
                    serde_json::Value::String(plan.subtasks.join("; ")),
                )
                .await;
        }

        if !state.internal_sources.is_empty() {
            let top5: Vec<String> = state.internal_sources.iter().take(5).map(|s| s.document_id.clone()).collect();
            let _ = self
                .memory
                .put(
                    &MemoryNamespace::episodic(&request.user_id, &request.chat_id, "retrieval"),
                    message_id,
                    serde_json::Value::String(top5.join(", ")),
                )
                .await;
        }

        if let Some(synthesis) = &state.synthesis_result {
            let prefix: String = synthesis.answer.chars().take(200).collect();
            let _ = self
                .memory
                .put(
                    &MemoryNamespace::episodic(&request.user_id, &request.chat_id, "synthesis"),
                    message_id,
                    serde_json::Value::String(prefix),
                )
                .await;
        }

        if let Some(verification) = &state.verification {
            let _ = self
                .memory
                .put(
                    &MemoryNamespace::episodic(&request.user_id, &request.chat_id, "critic"),
                    message_id,
                    json!(verification.confidence_score),
                )
                .await;
        }
    }
}

async fn run_retrieval_node(
    state: &ResearchState,
    engine: &RetrievalEngine,
    params: &RetrievalParams,
) -> Result<serde_json::Value> {
    let start = Instant::now();
    let wants_rag = state.execution_plan.as_ref().map(|p| p.wants(&PlanTool::Rag)).unwrap_or(true);
    if !wants_rag {
        return Ok(skip_timeline("retrieval", start, "skipped: plan has no rag step"));
    }

    let document_ids = (!state.document_ids.is_empty()).then(|| state.document_ids.clone());
    let memory_note = state
        .memory_context
        .as_ref()
        .and_then(|m| m.get("retrieval"))
        .map(|items| format_retrieval_memory(items))
        .unwrap_or_default();
    match engine.retrieve(&state.query, &state.user_id, document_ids, params, &memory_note).await {
        Ok(sources) => {
            let timeline = crate::state::TimelineEntry {
                agent_name: "retrieval".to_string(),
                result_summary: format!("{} chunk(s) retrieved", sources.len()),
                metadata: Default::default(),
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: chrono::Utc::now(),
            };
            Ok(json!({"internal_sources": sources, "agent_timeline": [timeline]}))
        }
        Err(e) => {
            warn!(error = %e, "retrieval failed, continuing with no internal sources");
            Ok(json!({
                "internal_sources": Vec::<crate::state::InternalSource>::new(),
                "agent_timeline": [failure_timeline("retrieval", start, &e.to_string())],
            }))
        }
    }
}

async fn run_web_search_node(
    state: &ResearchState,
    engine: &WebSearchEngine,
    max_results: usize,
    ctx: &crate::graph::NodeContext,
) -> Result<serde_json::Value> {
    let start = Instant::now();
    // spec §4.2 Testable Property 9: use_web=false never contacts the provider.
    let wants_web = state.use_web && state.execution_plan.as_ref().map(|p| p.wants(&PlanTool::Web)).unwrap_or(false);
    if !wants_web {
        return Ok(skip_timeline("web_search", start, "skipped: web search not requested"));
    }

    match engine.search(&state.query, max_results).await {
        Ok(outcome) => {
            if let Some(answer) = &outcome.quick_answer {
                ctx.emit(json!({"quick_answer": {"answer": answer, "source": "web_search"}}));
            }
            let timeline = crate::state::TimelineEntry {
                agent_name: "web_search".to_string(),
                result_summary: format!("{} web source(s) found", outcome.sources.len()),
                metadata: Default::default(),
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: chrono::Utc::now(),
            };
            Ok(json!({"web_sources": outcome.sources, "agent_timeline": [timeline]}))
        }
        Err(e) => {
            warn!(error = %e, "web search failed, continuing with no web sources");
            Ok(json!({
                "web_sources": Vec::<crate::state::WebSource>::new(),
                "agent_timeline": [failure_timeline("web_search", start, &e.to_string())],
            }))
        }
    }
}

async fn run_critic_node(state: &ResearchState, deps: &AgentDeps, timeout: Duration) -> Result<serde_json::Value> {
    match tokio::time::timeout(timeout, critic::run(state, deps)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("critic timed out, skipping refinement");
            let timeline = crate::state::TimelineEntry {
                agent_name: "critic".to_string(),
                result_summary: "timed out".to_string(),
                metadata: Default::default(),
                latency_ms: timeout.as_millis() as u64,
                timestamp: chrono::Utc::now(),
            };
            Ok(json!({
                "verification": crate::state::Verification::timeout(),
                "needs_refinement": false,
                "agent_timeline": [timeline],
            }))
        }
    }
}

fn skip_timeline(agent: &str, start: Instant, summary: &str) -> serde_json::Value {
    let timeline = crate::state::TimelineEntry {
        agent_name: agent.to_string(),
        result_summary: summary.to_string(),
        metadata: Default::default(),
        latency_ms: start.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now(),
    };
    json!({"agent_timeline": [timeline]})
}

fn failure_timeline(agent: &str, start: Instant, message: &str) -> crate::state::TimelineEntry {
    crate::state::TimelineEntry {
        agent_name: agent.to_string(),
        result_summary: format!("failed: {message}"),
        metadata: Default::default(),
        latency_ms: start.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now(),
    }
}

async fn translate_event(event: GraphEvent, events: &mpsc::Sender<ResearchEvent>) {
    match event {
        GraphEvent::NodeStart { node } => {
            let _ = events
                .send(ResearchEvent::AgentStatus {
                    node,
                    status: NodeStatus::Running,
                })
                .await;
        }
        GraphEvent::NodeEnd { node, .. } => {
            let _ = events
                .send(ResearchEvent::AgentStatus {
                    node,
                    status: NodeStatus::Complete,
                })
                .await;
        }
        GraphEvent::Custom { data, .. } => {
            if let Some(content) = data.get("thought_chunk").and_then(|v| v.as_str()) {
                let _ = events.send(ResearchEvent::ThoughtChunk { content: content.to_string() }).await;
            } else if let Some(content) = data.get("answer_chunk").and_then(|v| v.as_str()) {
                let _ = events.send(ResearchEvent::AnswerChunk { content: content.to_string() }).await;
            } else if let Some(quick) = data.get("quick_answer") {
                let answer = quick.get("answer").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let source = quick.get("source").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let _ = events.send(ResearchEvent::QuickAnswer { answer, source }).await;
            }
        }
        GraphEvent::Error { node, message } => {
            let _ = events
                .send(ResearchEvent::AgentStatus {
                    node,
                    status: NodeStatus::Error,
                })
                .await;
            warn!(%message, "graph node reported a recoverable error");
        }
        GraphEvent::Complete { .. } => {}
    }
}

/// Normalize internal + web + image sources into the uniform caller-facing
/// shape, internal-first then web then image to match source-packing order
/// (spec §4.2 post-graph step 1, Testable Property 7).
fn normalize_sources(state: &ResearchState) -> Vec<NormalizedSource> {
    let mut normalized = Vec::new();

    for source in &state.internal_sources {
        let mut extra = HashMap::new();
        extra.insert("chunk_id".to_string(), json!(source.chunk_id));
        extra.insert("document_id".to_string(), json!(source.document_id));
        normalized.push(NormalizedSource {
            source_type: NormalizedSourceType::Internal,
            content: source.content.clone(),
            score: source.score,
            extra,
        });
    }
    for source in &state.web_sources {
        let mut extra = HashMap::new();
        extra.insert("url".to_string(), json!(source.url));
        extra.insert("title".to_string(), json!(source.title));
        normalized.push(NormalizedSource {
            source_type: NormalizedSourceType::Web,
            content: source.content.clone(),
            score: source.relevance_score,
            extra,
        });
    }
    if let Some(synthesis) = &state.synthesis_result {
        for source in synthesis.source_map.values() {
            if let CitedSource::Image(image) = source {
                normalized.push(NormalizedSource {
                    source_type: NormalizedSourceType::Image,
                    content: image.url.clone(),
                    score: 1.0,
                    extra: HashMap::new(),
                });
            }
        }
    }

    normalized
}
