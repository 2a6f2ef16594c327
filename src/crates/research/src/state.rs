//! `ResearchState` — the record flowing through the graph (spec §3).
//!
//! The graph engine (`langgraph-core`) carries state as `serde_json::Value`
//! under a `StateSchema` of per-field reducers. `ResearchState` is the typed
//! view nodes and the orchestrator work with; [`ResearchState::reducer_schema`]
//! builds the matching `StateSchema` so the engine's JSON-level merge matches
//! these Rust semantics exactly. The only append-reducer field is
//! `agent_timeline`; everything else is last-write-wins, per spec §9's
//! "Graph-state reducer" design note.

use chrono::{DateTime, Utc};
use langgraph_core::state::{AppendReducer, OverwriteReducer, StateSchema};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single step in an [`ExecutionPlan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanTool {
    Rag,
    Web,
    Synthesis,
    Verification,
    ImageGen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: PlanTool,
    pub description: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

/// Output of the planner (C6). Invariant: `steps` is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub subtasks: Vec<String>,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub constraints: HashMap<String, serde_json::Value>,
}

impl ExecutionPlan {
    /// The default plan used when the planner's LLM output is malformed,
    /// or as a graph-level guarantee when `steps` would otherwise be empty
    /// (spec §4.3, Testable Property 8).
    pub fn default_plan() -> Self {
        Self {
            subtasks: vec!["Answer the query using available context".to_string()],
            steps: vec![
                PlanStep {
                    tool: PlanTool::Rag,
                    description: "Retrieve relevant context".to_string(),
                    parameters: HashMap::new(),
                },
                PlanStep {
                    tool: PlanTool::Synthesis,
                    description: "Synthesize a grounded answer".to_string(),
                    parameters: HashMap::new(),
                },
            ],
            constraints: HashMap::new(),
        }
    }

    pub fn wants(&self, tool: &PlanTool) -> bool {
        self.steps.iter().any(|s| &s.tool == tool)
    }
}

/// A chunk retrieved from the internal document index (C2/C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalSource {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// RRF score after fusion (spec §3).
    pub score: f64,
    pub dense_score: Option<f64>,
    pub sparse_score: Option<f64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A result from the web search client (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    pub title: String,
    pub content: String,
    pub raw_content: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    /// Raw provider score.
    pub score: f64,
    /// Composite score after re-ranking (spec §4.5).
    pub relevance_score: f64,
}

/// A reference to an image attachment already scoped to the chat (spec §9
/// Open Question: attachments arrive pre-scoped in `image_contexts`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub description: Option<String>,
}

/// A cited source slot in `source_map`, keyed by the 1-based ordinal that
/// appears as `[Source N]` in the synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CitedSource {
    Internal(InternalSource),
    Web(WebSource),
    Image(ImageRef),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Output of the synthesis agent (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub answer: String,
    pub sources_used: Vec<u32>,
    pub confidence: Confidence,
    #[serde(default)]
    pub sections: Vec<String>,
    pub source_map: HashMap<u32, CitedSource>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    PartiallyVerified,
    Unverified,
    Timeout,
    Error,
}

impl VerificationStatus {
    /// Whether this status, combined with the iteration budget, should
    /// route back to synthesis (spec §4.7 "Refinement gate").
    pub fn needs_refinement(self) -> bool {
        matches!(
            self,
            VerificationStatus::PartiallyVerified
                | VerificationStatus::Unverified
                | VerificationStatus::Error
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsupportedClaim {
    pub claim: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingInformation {
    pub topic: String,
    pub source_a: u32,
    pub source_b: u32,
    pub description: String,
}

/// Output of the critic agent (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub verification_status: VerificationStatus,
    pub confidence_score: f64,
    #[serde(default)]
    pub verified_claims: Vec<String>,
    #[serde(default)]
    pub unsupported_claims: Vec<UnsupportedClaim>,
    #[serde(default)]
    pub coverage_gaps: Vec<String>,
    #[serde(default)]
    pub conflicting_information: Vec<ConflictingInformation>,
    pub overall_assessment: String,
}

impl Verification {
    pub fn timeout() -> Self {
        Self {
            verification_status: VerificationStatus::Timeout,
            confidence_score: 0.0,
            verified_claims: Vec::new(),
            unsupported_claims: Vec::new(),
            coverage_gaps: Vec::new(),
            conflicting_information: Vec::new(),
            overall_assessment: "Verification timed out".to_string(),
        }
    }

    pub fn parse_error() -> Self {
        Self {
            verification_status: VerificationStatus::Unverified,
            confidence_score: 0.0,
            verified_claims: Vec::new(),
            unsupported_claims: Vec::new(),
            coverage_gaps: Vec::new(),
            conflicting_information: Vec::new(),
            overall_assessment: "technical error".to_string(),
        }
    }
}

/// An entry in the append-only `agent_timeline` (spec §3/§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub agent_name: String,
    pub result_summary: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// A namespaced memory item (spec §3/§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The record flowing through the graph (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    // Immutable input
    pub query: String,
    pub user_id: String,
    pub chat_id: String,
    pub thread_id: String,
    pub session_id: String,
    pub use_web: bool,
    pub document_ids: Vec<String>,

    // Set once by planner / retrieval / web_search
    pub execution_plan: Option<ExecutionPlan>,
    pub internal_sources: Vec<InternalSource>,
    pub web_sources: Vec<WebSource>,
    pub image_contexts: Vec<ImageRef>,
    pub generated_image_url: Option<String>,

    // Replaced on refinement / each critic pass
    pub synthesis_result: Option<SynthesisResult>,
    pub verification: Option<Verification>,

    // Append-only
    pub agent_timeline: Vec<TimelineEntry>,

    // Loop control
    pub iteration_count: u32,
    pub needs_refinement: bool,
    pub max_iterations: u32,

    // Memory context, per agent name
    pub memory_context: Option<HashMap<String, Vec<Memory>>>,
}

impl ResearchState {
    pub fn new(
        query: impl Into<String>,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        thread_id: impl Into<String>,
        session_id: impl Into<String>,
        use_web: bool,
        document_ids: Vec<String>,
        max_iterations: u32,
    ) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            thread_id: thread_id.into(),
            session_id: session_id.into(),
            use_web,
            document_ids,
            execution_plan: None,
            internal_sources: Vec::new(),
            web_sources: Vec::new(),
            image_contexts: Vec::new(),
            generated_image_url: None,
            synthesis_result: None,
            verification: None,
            agent_timeline: Vec::new(),
            iteration_count: 0,
            needs_refinement: false,
            max_iterations,
            memory_context: None,
        }
    }

    /// `StateSchema` with the reducer rules the engine applies when merging
    /// node outputs — `agent_timeline` appends, everything else replaces.
    pub fn reducer_schema() -> StateSchema {
        let mut schema = StateSchema::new();
        schema.add_field("agent_timeline", Box::new(AppendReducer));
        for field in [
            "execution_plan",
            "internal_sources",
            "web_sources",
            "image_contexts",
            "generated_image_url",
            "synthesis_result",
            "verification",
            "iteration_count",
            "needs_refinement",
            "memory_context",
        ] {
            schema.add_field(field, Box::new(OverwriteReducer));
        }
        schema
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("ResearchState is always serializable")
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_is_non_empty_and_has_synthesis() {
        let plan = ExecutionPlan::default_plan();
        assert!(!plan.steps.is_empty());
        assert!(plan.wants(&PlanTool::Synthesis));
    }

    #[test]
    fn verification_status_drives_refinement() {
        assert!(VerificationStatus::Unverified.needs_refinement());
        assert!(VerificationStatus::PartiallyVerified.needs_refinement());
        assert!(!VerificationStatus::Verified.needs_refinement());
        assert!(!VerificationStatus::Timeout.needs_refinement());
    }

    #[test]
    fn state_roundtrips_through_json() {
        let state = ResearchState::new("q", "u1", "c1", "t1", "s1", false, vec![], 2);
        let value = state.to_value();
        let restored = ResearchState::from_value(value).unwrap();
        assert_eq!(restored.query, "q");
        assert_eq!(restored.max_iterations, 2);
    }
}
