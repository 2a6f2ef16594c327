//! C7 — Synthesis: packs retrieved context into a cited answer, streaming
//! tokens to the caller as it goes (spec §4.6).
//!
//! Runs in one of two modes: initial synthesis (first pass) or refinement
//! (the critic routed back with `state.verification` set). Refinement
//! prompts include the prior answer plus the critic's unsupported claims,
//! coverage gaps and conflicting information so the model can address them
//! directly rather than starting over.

use std::collections::HashMap;
use std::time::Instant;

use futures::StreamExt;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::gateway::{GatewayStreamItem, ImageBytes};
use crate::graph::NodeContext;
use crate::memory_store::format_synthesis_memory;
use crate::state::{
    CitedSource, Confidence, ResearchState, SynthesisResult, TimelineEntry,
};

use super::AgentDeps;

const CONCISE_MARKERS: &[&str] = &["brief", "briefly", "summary", "summarize", "tldr", "tl;dr", "short answer", "in short"];

fn wants_concise(query: &str) -> bool {
    let lower = query.to_lowercase();
    CONCISE_MARKERS.iter().any(|m| lower.contains(m))
}

fn citation_regex() -> Regex {
    Regex::new(r"\[Source (\d+)\]").expect("citation regex is valid")
}

/// Build `source_map`: internal sources first, then web, then the one
/// generated image if present, numbered from 1 (spec §4.6 "Source packing").
fn pack_sources(state: &ResearchState) -> (String, HashMap<u32, CitedSource>) {
    let mut context = String::new();
    let mut source_map = HashMap::new();
    let mut ordinal = 1u32;

    for src in &state.internal_sources {
        context.push_str(&format!("[Source {ordinal}] (internal document)\n{}\n\n", src.content));
        source_map.insert(ordinal, CitedSource::Internal(src.clone()));
        ordinal += 1;
    }
    for src in &state.web_sources {
        context.push_str(&format!("[Source {ordinal}] ({})\n{}\n\n", src.url, src.content));
        source_map.insert(ordinal, CitedSource::Web(src.clone()));
        ordinal += 1;
    }
    if let Some(url) = &state.generated_image_url {
        context.push_str(&format!("[Source {ordinal}] (generated image)\n{url}\n\n"));
        source_map.insert(
            ordinal,
            CitedSource::Image(crate::state::ImageRef {
                url: url.clone(),
                description: None,
            }),
        );
    }

    (context, source_map)
}

fn build_prompt(state: &ResearchState, context: &str, memory_note: &str) -> (String, String) {
    let concise_hint = if wants_concise(&state.query) {
        "The user asked for a brief answer. Keep it to 2-3 sentences."
    } else {
        "Write a thorough, well-organized answer."
    };

    if let Some(verification) = &state.verification {
        let prior_answer = state
            .synthesis_result
            .as_ref()
            .map(|r| r.answer.as_str())
            .unwrap_or("");
        let claims: Vec<String> = verification
            .unsupported_claims
            .iter()
            .map(|c| format!("- \"{}\": {}", c.claim, c.reason))
            .collect();
        let gaps: Vec<String> = verification.coverage_gaps.iter().map(|g| format!("- {g}")).collect();
        let conflicts: Vec<String> = verification
            .conflicting_information
            .iter()
            .map(|c| format!("- {} (Source {} vs Source {}): {}", c.topic, c.source_a, c.source_b, c.description))
            .collect();

        let system = format!(
            "You are a research assistant revising a previous answer. {concise_hint} \
Cite sources inline as [Source N] using only the numbers given in the context below."
        );
        let mut prompt = format!(
            "Query: {}\n\nSource context:\n{context}\nPrevious answer:\n{prior_answer}\n\n\
Unsupported claims to fix:\n{}\nCoverage gaps to fill:\n{}\nConflicting information to reconcile:\n{}\n\n\
Write a revised answer addressing all of the above.",
            state.query,
            if claims.is_empty() { "(none)".to_string() } else { claims.join("\n") },
            if gaps.is_empty() { "(none)".to_string() } else { gaps.join("\n") },
            if conflicts.is_empty() { "(none)".to_string() } else { conflicts.join("\n") },
        );
        if !memory_note.is_empty() {
            prompt.push_str(&format!("\nPrior answer recollection: {memory_note}"));
        }
        (system, prompt)
    } else {
        let system = format!(
            "You are a research assistant. {concise_hint} Cite sources inline as \
[Source N] using only the numbers given in the context below."
        );
        let mut prompt = format!("Query: {}\n\nSource context:\n{context}\n\nWrite the answer.", state.query);
        if !memory_note.is_empty() {
            prompt.push_str(&format!("\nPrior answer recollection: {memory_note}"));
        }
        (system, prompt)
    }
}

pub async fn run(state: &ResearchState, deps: &AgentDeps, ctx: &NodeContext) -> Result<serde_json::Value> {
    let start = Instant::now();
    let (context, source_map) = pack_sources(state);
    let memory_note = state
        .memory_context
        .as_ref()
        .and_then(|m| m.get("synthesis"))
        .map(|items| format_synthesis_memory(items))
        .unwrap_or_default();
    let (system, prompt) = build_prompt(state, &context, &memory_note);

    let result = if !state.image_contexts.is_empty() {
        synthesize_multimodal(state, deps, ctx, &system, &prompt, source_map).await
    } else {
        synthesize_streaming(state, deps, ctx, &system, &prompt, source_map).await
    };

    match result {
        Ok(synthesis) => {
            let timeline = TimelineEntry {
                agent_name: "synthesis".to_string(),
                result_summary: format!("answer with {} cited source(s)", synthesis.sources_used.len()),
                metadata: Default::default(),
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: chrono::Utc::now(),
            };
            Ok(json!({
                "synthesis_result": synthesis,
                "agent_timeline": [timeline],
            }))
        }
        Err(e) => {
            warn!(error = %e, "synthesis failed, emitting fallback answer");
            let fallback = "I ran into a problem putting together an answer. Please try again.";
            ctx.emit(json!({"answer_chunk": fallback}));
            let synthesis = SynthesisResult {
                answer: fallback.to_string(),
                sources_used: Vec::new(),
                confidence: Confidence::Low,
                sections: Vec::new(),
                source_map,
                reasoning: None,
            };
            let timeline = TimelineEntry {
                agent_name: "synthesis".to_string(),
                result_summary: format!("synthesis failed: {e}"),
                metadata: Default::default(),
                latency_ms: start.elapsed().as_millis() as u64,
                timestamp: chrono::Utc::now(),
            };
            Ok(json!({
                "synthesis_result": synthesis,
                "agent_timeline": [timeline],
            }))
        }
    }
}

async fn synthesize_multimodal(
    state: &ResearchState,
    deps: &AgentDeps,
    ctx: &NodeContext,
    system: &str,
    prompt: &str,
    source_map: HashMap<u32, CitedSource>,
) -> Result<SynthesisResult> {
    let mut images = Vec::with_capacity(state.image_contexts.len());
    for image_ref in &state.image_contexts {
        match deps.object_storage.fetch_image(&image_ref.url).await {
            Ok(Some(bytes)) => images.push(ImageBytes {
                mime_type: "image/png".to_string(),
                bytes,
            }),
            Ok(None) => warn!(url = %image_ref.url, "image attachment not found in object storage, skipping"),
            Err(e) => warn!(error = %e, url = %image_ref.url, "failed to fetch image attachment, skipping"),
        }
    }
    let answer = deps.gateway.generate_with_images(prompt, Some(system), &images).await?;
    ctx.emit(json!({"answer_chunk": answer}));
    Ok(finish(&answer, source_map))
}

async fn synthesize_streaming(
    state: &ResearchState,
    deps: &AgentDeps,
    ctx: &NodeContext,
    system: &str,
    prompt: &str,
    source_map: HashMap<u32, CitedSource>,
) -> Result<SynthesisResult> {
    let mut stream = deps
        .gateway
        .generate_stream(prompt, Some(system), 0.4, 2048, true)
        .await?;

    let mut answer = String::new();
    while let Some(item) = stream.next().await {
        if ctx.is_cancelled() {
            break;
        }
        match item {
            GatewayStreamItem::Thought(t) => ctx.emit(json!({"thought_chunk": t})),
            GatewayStreamItem::Text(t) => {
                answer.push_str(&t);
                ctx.emit(json!({"answer_chunk": t}));
            }
        }
    }

    if let Some(url) = &state.generated_image_url {
        let markdown = format!("\n\n![Generated Image]({url})");
        answer.push_str(&markdown);
        ctx.emit(json!({"answer_chunk": markdown}));
    }

    Ok(finish(&answer, source_map))
}

fn finish(answer: &str, source_map: HashMap<u32, CitedSource>) -> SynthesisResult {
    let re = citation_regex();
    let mut sources_used: Vec<u32> = re
        .captures_iter(answer)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|n| source_map.contains_key(n))
        .collect();
    sources_used.sort_unstable();
    sources_used.dedup();

    SynthesisResult {
        answer: answer.to_string(),
        sources_used,
        confidence: Confidence::Medium,
        sections: Vec::new(),
        source_map,
        reasoning: None,
    }
}
