//! C6 — Planner: decides which tools the query needs (spec §4.3).
//!
//! Contract: always include a `synthesis` step; include `verification` when
//! the query makes factual claims worth checking; include `web` when the
//! query needs information beyond the indexed documents or `use_web` was
//! requested; include `image_gen` only when the query explicitly asks for an
//! image. Malformed LLM output falls back to [`ExecutionPlan::default_plan`]
//! (Testable Property 8) rather than failing the graph.

use std::time::Instant;

use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::json_recovery::recover_json;
use crate::memory_store::{format_planner_memory, MemoryNamespace};
use crate::state::{ExecutionPlan, ResearchState, TimelineEntry};

use super::AgentDeps;

const SYSTEM_PROMPT: &str = "You are a planning agent for a research assistant. \
Given a user query, decide which steps are needed to answer it well. Always \
include a synthesis step. Include a verification step when the answer will \
contain checkable factual claims. Include a web step when the query needs \
information beyond a private document index, or ask about current events. \
Include an image_gen step only if the user explicitly asked for an image to \
be generated. Respond with a JSON object: {\"subtasks\": [string], \
\"steps\": [{\"tool\": \"rag\"|\"web\"|\"synthesis\"|\"verification\"|\"image_gen\", \
\"description\": string}], \"constraints\": {}}.";

pub async fn run(state: &ResearchState, deps: &AgentDeps) -> Result<serde_json::Value> {
    let start = Instant::now();

    let memory_note = state
        .memory_context
        .as_ref()
        .and_then(|m| m.get("planner"))
        .map(|items| format_planner_memory(items))
        .unwrap_or_default();

    let prompt = if memory_note.is_empty() {
        format!("Query: {}\nuse_web hint: {}", state.query, state.use_web)
    } else {
        format!(
            "Query: {}\nuse_web hint: {}\nRecent planning notes:\n{memory_note}",
            state.query, state.use_web
        )
    };

    let plan = match deps
        .gateway
        .generate_json(&prompt, Some(SYSTEM_PROMPT), 0.2, Some(512))
        .await
    {
        Ok(raw) => recover_json(&raw)
            .and_then(|v| serde_json::from_value::<ExecutionPlan>(v).ok())
            .filter(|p| !p.steps.is_empty())
            .unwrap_or_else(|| {
                warn!("planner output was not a usable plan, using the default plan");
                ExecutionPlan::default_plan()
            }),
        Err(e) => {
            warn!(error = %e, "planner request failed, using the default plan");
            ExecutionPlan::default_plan()
        }
    };

    let _ = deps
        .memory
        .put(
            &MemoryNamespace::episodic(&state.user_id, &state.chat_id, "planner"),
            &state.session_id,
            serde_json::Value::String(plan.subtasks.join("; ")),
        )
        .await;

    let timeline = TimelineEntry {
        agent_name: "planner".to_string(),
        result_summary: format!("{} step(s) planned", plan.steps.len()),
        metadata: Default::default(),
        latency_ms: start.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now(),
    };

    Ok(json!({
        "execution_plan": plan,
        "agent_timeline": [timeline],
    }))
}
