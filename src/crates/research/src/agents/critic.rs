//! C8 — Critic: verifies the synthesized answer against its cited sources
//! and decides whether to route back to synthesis (spec §4.7).
//!
//! The refinement gate itself — `iteration_count < max_iterations` AND
//! `verification_status.needs_refinement()` — is decided here and baked
//! into `needs_refinement`/`iteration_count` on the returned update, so the
//! graph's conditional edge only has to read those two fields (the
//! condition closure lives in the not-yet-written orchestrator, grounded on
//! this agent's output shape).

use std::time::Instant;

use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::json_recovery::recover_json;
use crate::memory_store::format_critic_memory;
use crate::state::{ResearchState, TimelineEntry, Verification};

use super::AgentDeps;

const SYSTEM_PROMPT: &str = "You are a fact-checking critic for a research assistant. \
Given a query, a synthesized answer, and its numbered source context, verify every \
factual claim in the answer against the sources. Identify claims with no supporting \
source, contradictions between sources, and gaps where the query asked for something \
the answer does not cover. Respond with a JSON object: {\"verification_status\": \
\"verified\"|\"partially_verified\"|\"unverified\", \"confidence_score\": number 0-1, \
\"verified_claims\": [string], \"unsupported_claims\": [{\"claim\": string, \"reason\": \
string}], \"coverage_gaps\": [string], \"conflicting_information\": [{\"topic\": string, \
\"source_a\": number, \"source_b\": number, \"description\": string}], \
\"overall_assessment\": string}.";

pub async fn run(state: &ResearchState, deps: &AgentDeps) -> Result<serde_json::Value> {
    let start = Instant::now();

    let Some(synthesis) = &state.synthesis_result else {
        // Nothing to verify yet; leave the graph's default (unverified, no
        // refinement) rather than guessing at a claim that doesn't exist.
        let timeline = TimelineEntry {
            agent_name: "critic".to_string(),
            result_summary: "skipped: no synthesis result to verify".to_string(),
            metadata: Default::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        };
        return Ok(json!({"agent_timeline": [timeline]}));
    };

    let source_context = render_source_context(synthesis);
    let memory_note = state
        .memory_context
        .as_ref()
        .and_then(|m| m.get("critic"))
        .map(|items| format_critic_memory(items))
        .unwrap_or_default();
    let mut prompt = format!(
        "Query: {}\n\nAnswer:\n{}\n\nSources:\n{source_context}",
        state.query, synthesis.answer
    );
    if !memory_note.is_empty() {
        prompt.push_str(&format!("\nPast verification track record: {memory_note}"));
    }

    let verification = match deps.gateway.generate_json(&prompt, Some(SYSTEM_PROMPT), 0.0, Some(768)).await {
        Ok(raw) => recover_json(&raw)
            .and_then(|v| serde_json::from_value::<Verification>(v).ok())
            .unwrap_or_else(|| {
                warn!("critic output was not a usable verification, treating as unverified");
                Verification::parse_error()
            }),
        Err(e) => {
            warn!(error = %e, "critic request failed, treating as unverified");
            Verification::parse_error()
        }
    };

    let next_iteration = state.iteration_count + 1;
    let needs_refinement =
        next_iteration <= state.max_iterations && verification.verification_status.needs_refinement();

    let timeline = TimelineEntry {
        agent_name: "critic".to_string(),
        result_summary: format!("{:?}, confidence {:.2}", verification.verification_status, verification.confidence_score),
        metadata: Default::default(),
        latency_ms: start.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now(),
    };

    Ok(json!({
        "verification": verification,
        "iteration_count": next_iteration,
        "needs_refinement": needs_refinement,
        "agent_timeline": [timeline],
    }))
}

fn render_source_context(synthesis: &crate::state::SynthesisResult) -> String {
    let mut ordinals: Vec<&u32> = synthesis.source_map.keys().collect();
    ordinals.sort();
    ordinals
        .into_iter()
        .map(|n| match &synthesis.source_map[n] {
            crate::state::CitedSource::Internal(s) => format!("[Source {n}] {}", s.content),
            crate::state::CitedSource::Web(s) => format!("[Source {n}] ({}) {}", s.url, s.content),
            crate::state::CitedSource::Image(s) => format!("[Source {n}] generated image {}", s.url),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
