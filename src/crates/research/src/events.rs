//! The outbound, caller-facing event stream (spec §6).
//!
//! Tagged-enum serialization follows the same `#[serde(tag = "type")]`
//! convention `orchestrator::api::ws::events::RealtimeEvent` uses for its
//! real-time event stream, flattened (no `content` wrapper) so each event
//! serializes as `{type, ...fields}` exactly as spec §6 specifies.

use crate::state::{Confidence, Verification};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A source normalized into a uniform shape for the `sources` event
/// (spec §4.2 post-graph step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedSource {
    #[serde(rename = "type")]
    pub source_type: NormalizedSourceType,
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedSourceType {
    Internal,
    Web,
    Image,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Complete,
    Timeout,
    Error,
}

/// A caller-facing event, tagged by `type` (spec §6 table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    MessageId {
        message_id: String,
    },
    AgentStatus {
        node: String,
        status: NodeStatus,
    },
    ThoughtChunk {
        content: String,
    },
    AnswerChunk {
        content: String,
    },
    Sources {
        sources: Vec<NormalizedSource>,
    },
    QuickAnswer {
        answer: String,
        source: String,
    },
    TitleUpdated {
        title: String,
        chat_id: String,
    },
    Complete {
        message_id: String,
        confidence: ConfidenceLabel,
        total_latency_ms: u64,
        sources: Vec<NormalizedSource>,
        verification: Option<Verification>,
        answer: String,
    },
    Error {
        message: String,
    },
}

/// Confidence as reported in the terminal `complete` event; `timeout` is a
/// distinct label the critic's timeout path produces (spec Testable Property 10).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
    Timeout,
}

impl From<Confidence> for ConfidenceLabel {
    fn from(c: Confidence) -> Self {
        match c {
            Confidence::High => ConfidenceLabel::High,
            Confidence::Medium => ConfidenceLabel::Medium,
            Confidence::Low => ConfidenceLabel::Low,
        }
    }
}
