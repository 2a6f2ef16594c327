//! C9 — Image Gen: runs only if the plan contains an `image_gen` step
//! (spec §4.8). On success, stores bytes under
//! `users/{user_id}/images/{uuid}.png` and records a timeline entry; on
//! failure records a timeline entry with the error and returns no URL. This
//! agent never fails the graph — a failed generation degrades to "no
//! image", not a cancelled session.

use std::time::Instant;

use serde_json::json;

use crate::error::Result;
use crate::state::{PlanTool, ResearchState, TimelineEntry};

use super::AgentDeps;

pub async fn run(state: &ResearchState, deps: &AgentDeps) -> Result<serde_json::Value> {
    let start = Instant::now();

    let Some(plan) = &state.execution_plan else {
        return Ok(skip_entry(start));
    };
    if !plan.wants(&PlanTool::ImageGen) {
        return Ok(skip_entry(start));
    }

    let description = plan
        .steps
        .iter()
        .find(|s| s.tool == PlanTool::ImageGen)
        .map(|s| s.description.as_str())
        .filter(|d| !d.is_empty())
        .unwrap_or(&state.query);

    match deps.gateway.generate_image(description, 1).await {
        Ok(mut images) if !images.is_empty() => {
            let bytes = images.remove(0);
            match deps.object_storage.put_image(&state.user_id, bytes).await {
                Ok(url) => {
                    let timeline = TimelineEntry {
                        agent_name: "image_gen".to_string(),
                        result_summary: "generated 1 image".to_string(),
                        metadata: Default::default(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        timestamp: chrono::Utc::now(),
                    };
                    Ok(json!({
                        "generated_image_url": url,
                        "agent_timeline": [timeline],
                    }))
                }
                Err(e) => Ok(failure_entry(start, &e.to_string())),
            }
        }
        Ok(_) => Ok(failure_entry(start, "provider returned no images")),
        Err(e) => Ok(failure_entry(start, &e.to_string())),
    }
}

fn skip_entry(start: Instant) -> serde_json::Value {
    json!({
        "agent_timeline": [TimelineEntry {
            agent_name: "image_gen".to_string(),
            result_summary: "skipped: no image_gen step in plan".to_string(),
            metadata: Default::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        }],
    })
}

fn failure_entry(start: Instant, message: &str) -> serde_json::Value {
    json!({
        "agent_timeline": [TimelineEntry {
            agent_name: "image_gen".to_string(),
            result_summary: format!("image generation failed: {message}"),
            metadata: Default::default(),
            latency_ms: start.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now(),
        }],
    })
}
