//! End-to-end scenarios driven entirely through in-memory fakes (spec §8):
//! pure RAG, web-only, the refinement loop, image generation, tenant
//! isolation, and cancellation. No network calls anywhere in this file.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use research::config::ResearchConfig;
use research::error::Result;
use research::events::{ConfidenceLabel, ResearchEvent};
use research::gateway::fake::FakeGateway;
use research::gateway::Gateway;
use research::graph::CancellationToken;
use research::memory_store::InMemoryMemoryStore;
use research::persistence::{InMemoryObjectStorage, InMemorySessionStore};
use research::vector::memory::InMemoryVectorIndex;
use research::vector::{VectorIndexClient, VectorPoint};
use research::web_search::{RawWebResult, WebSearchProvider};
use research::{InMemoryDocumentRegistry, Orchestrator, ResearchRequest};
use tokio::sync::mpsc;

struct NoopWeb;

#[async_trait]
impl WebSearchProvider for NoopWeb {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<RawWebResult>> {
        Ok(vec![])
    }
    async fn quick_answer(&self, _query: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A scripted web provider returning one fixed hit, for scenarios that need
/// `use_web` to actually produce a source.
struct ScriptedWeb {
    hit: RawWebResult,
}

#[async_trait]
impl WebSearchProvider for ScriptedWeb {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<RawWebResult>> {
        Ok(vec![self.hit.clone()])
    }
    async fn quick_answer(&self, _query: &str) -> Result<Option<String>> {
        Ok(Some("a quick answer".to_string()))
    }
}

fn plan_json(tools: &[&str]) -> String {
    let steps: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| serde_json::json!({"tool": t, "description": format!("do {t}")}))
        .collect();
    serde_json::json!({
        "subtasks": ["answer the query"],
        "steps": steps,
        "constraints": {}
    })
    .to_string()
}

fn verified_json() -> String {
    serde_json::json!({
        "verification_status": "verified",
        "confidence_score": 0.9,
        "verified_claims": ["Paris is the capital of France"],
        "unsupported_claims": [],
        "coverage_gaps": [],
        "conflicting_information": [],
        "overall_assessment": "fully supported"
    })
    .to_string()
}

fn unverified_json() -> String {
    serde_json::json!({
        "verification_status": "unverified",
        "confidence_score": 0.2,
        "verified_claims": [],
        "unsupported_claims": [{"claim": "Paris is the capital", "reason": "no citation"}],
        "coverage_gaps": ["no population figure"],
        "conflicting_information": [],
        "overall_assessment": "needs another pass"
    })
    .to_string()
}

async fn seed_vector_index(index: &InMemoryVectorIndex, gateway: &dyn Gateway, user_id: &str, document_id: &str) {
    let dense = gateway.embed("Paris is the capital of France.").await.unwrap();
    index
        .upsert(vec![VectorPoint {
            chunk_id: "chunk-1".to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            content: "Paris is the capital of France.".to_string(),
            filename: Some("geography.md".to_string()),
            metadata: HashMap::new(),
            dense,
            sparse: vec![],
            late_interaction: vec![],
        }])
        .await
        .unwrap();
}

async fn drain(rx: &mut mpsc::Receiver<ResearchEvent>) -> Vec<ResearchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// S1 — Pure RAG: a query against the internal index only, no web, no
/// images, verification passes on the first pass.
#[tokio::test]
async fn s1_pure_rag_session_produces_cited_answer_with_no_refinement() {
    let gateway: Arc<dyn Gateway> = Arc::new(
        FakeGateway::new().with_json_responses(vec![plan_json(&["rag", "synthesis"]), verified_json()]),
    );
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    seed_vector_index(&vector_index, gateway.as_ref(), "u1", "doc-1").await;

    let documents = Arc::new(InMemoryDocumentRegistry::new());
    documents.register("u1", "c1", vec!["doc-1".to_string()]);

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        vector_index,
        Arc::new(NoopWeb),
        Arc::new(InMemoryMemoryStore::new(gateway)),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryObjectStorage::new()),
        documents,
        ResearchConfig::default(),
    );

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "what is the capital of france".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: false,
        document_ids: None,
        max_iterations: Some(2),
    };
    orchestrator.run(request, tx, CancellationToken::new()).await.unwrap();

    let events = drain(&mut rx).await;
    let complete = events
        .iter()
        .find_map(|e| match e {
            ResearchEvent::Complete { answer, confidence, sources, .. } => Some((answer, confidence, sources)),
            _ => None,
        })
        .expect("a complete event");
    assert!(complete.0.contains("Paris"));
    assert_eq!(*complete.1, ConfidenceLabel::Medium);
    assert!(complete.2.iter().any(|s| matches!(s.source_type, research::events::NormalizedSourceType::Internal)));
    assert!(!events.iter().any(|e| matches!(e, ResearchEvent::Error { .. })));
}

/// S2 — Web-only session: `use_web=true`, query expansion and a scripted
/// provider hit become a normalized web source, plus a `quick_answer` event.
#[tokio::test]
async fn s2_web_only_session_surfaces_a_quick_answer_and_web_source() {
    let gateway: Arc<dyn Gateway> = Arc::new(FakeGateway::new().with_json_responses(vec![
        plan_json(&["web", "synthesis"]),
        serde_json::json!({
            "primary_query": "capital of france",
            "alternative_queries": [],
            "query_type": "factual"
        })
        .to_string(),
        verified_json(),
    ]));
    let web = Arc::new(ScriptedWeb {
        hit: RawWebResult {
            url: "https://example.com/france".to_string(),
            title: "France".to_string(),
            content: "Paris is the capital of France.".to_string(),
            raw_content: None,
            published_date: None,
            score: 0.8,
        },
    });

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        Arc::new(InMemoryVectorIndex::new()),
        web,
        Arc::new(InMemoryMemoryStore::new(gateway)),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryObjectStorage::new()),
        Arc::new(InMemoryDocumentRegistry::new()),
        ResearchConfig::default(),
    );

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "what is the capital of france".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: true,
        document_ids: None,
        max_iterations: Some(2),
    };
    orchestrator.run(request, tx, CancellationToken::new()).await.unwrap();

    let events = drain(&mut rx).await;
    assert!(events.iter().any(|e| matches!(e, ResearchEvent::QuickAnswer { .. })));
    let sources = events
        .iter()
        .find_map(|e| match e {
            ResearchEvent::Sources { sources } => Some(sources),
            _ => None,
        })
        .expect("a sources event");
    assert!(sources.iter().any(|s| matches!(s.source_type, research::events::NormalizedSourceType::Web)));
}

/// S3 — Refinement loop: the critic reports `unverified` on the first pass,
/// forcing one extra trip through synthesis, then verifies on the second.
#[tokio::test]
async fn s3_unverified_critic_output_triggers_exactly_one_refinement_pass() {
    let gateway: Arc<dyn Gateway> = Arc::new(FakeGateway::new().with_json_responses(vec![
        plan_json(&["rag", "synthesis", "verification"]),
        unverified_json(),
        verified_json(),
    ]));
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    seed_vector_index(&vector_index, gateway.as_ref(), "u1", "doc-1").await;

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        vector_index,
        Arc::new(NoopWeb),
        Arc::new(InMemoryMemoryStore::new(gateway)),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryObjectStorage::new()),
        Arc::new(InMemoryDocumentRegistry::new()),
        ResearchConfig::default(),
    );

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "what is the capital of france".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: false,
        document_ids: None,
        max_iterations: Some(2),
    };
    orchestrator.run(request, tx, CancellationToken::new()).await.unwrap();

    let events = drain(&mut rx).await;
    let complete = events
        .iter()
        .find_map(|e| match e {
            ResearchEvent::Complete { verification, .. } => Some(verification),
            _ => None,
        })
        .expect("a complete event");
    let verification = complete.as_ref().expect("a verification result");
    assert_eq!(
        verification.verification_status,
        research::state::VerificationStatus::Verified
    );

    let synthesis_runs = events
        .iter()
        .filter(|e| matches!(e, ResearchEvent::AgentStatus { node, status } if node.as_str() == "synthesis" && matches!(status, research::events::NodeStatus::Complete)))
        .count();
    assert_eq!(synthesis_runs, 2, "synthesis should run once, then once more on refinement");
}

/// S4 — Image generation path: the plan requests `image_gen`, the fake
/// gateway returns image bytes, object storage receives them, and the
/// synthesized answer links the stored URL.
#[tokio::test]
async fn s4_image_gen_step_stores_an_image_and_links_it_in_the_answer() {
    let gateway: Arc<dyn Gateway> = Arc::new(
        FakeGateway::new().with_json_responses(vec![plan_json(&["synthesis", "image_gen"]), verified_json()]),
    );
    let object_storage = Arc::new(InMemoryObjectStorage::new());

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        Arc::new(InMemoryVectorIndex::new()),
        Arc::new(NoopWeb),
        Arc::new(InMemoryMemoryStore::new(gateway)),
        Arc::new(InMemorySessionStore::new()),
        object_storage.clone(),
        Arc::new(InMemoryDocumentRegistry::new()),
        ResearchConfig::default(),
    );

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "generate an image of the eiffel tower".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: false,
        document_ids: None,
        max_iterations: Some(2),
    };
    orchestrator.run(request, tx, CancellationToken::new()).await.unwrap();

    let events = drain(&mut rx).await;
    let complete = events
        .iter()
        .find_map(|e| match e {
            ResearchEvent::Complete { answer, sources, .. } => Some((answer, sources)),
            _ => None,
        })
        .expect("a complete event");
    assert!(complete.1.iter().any(|s| matches!(s.source_type, research::events::NormalizedSourceType::Image)));
    assert!(complete.0.contains("!["), "answer should embed the generated image as markdown");
}

/// S5 — Tenant isolation: the caller supplies a document id from a different
/// chat; the orchestrator always replaces it with the chat-scoped registry
/// result rather than trusting the caller (spec Testable Property 4).
#[tokio::test]
async fn s5_caller_supplied_document_ids_from_another_chat_are_replaced() {
    let gateway: Arc<dyn Gateway> = Arc::new(
        FakeGateway::new().with_json_responses(vec![plan_json(&["rag", "synthesis"]), verified_json()]),
    );
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    seed_vector_index(&vector_index, gateway.as_ref(), "u1", "own-doc").await;

    let documents = Arc::new(InMemoryDocumentRegistry::new());
    documents.register("u1", "c1", vec!["own-doc".to_string()]);

    let sessions = Arc::new(InMemorySessionStore::new());
    let orchestrator = Orchestrator::new(
        gateway.clone(),
        vector_index,
        Arc::new(NoopWeb),
        Arc::new(InMemoryMemoryStore::new(gateway)),
        sessions.clone(),
        Arc::new(InMemoryObjectStorage::new()),
        documents,
        ResearchConfig::default(),
    );

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "summarize the document".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: false,
        document_ids: Some(vec!["someone-elses-doc".to_string()]),
        max_iterations: Some(1),
    };
    orchestrator.run(request, tx, CancellationToken::new()).await.unwrap();

    let events = drain(&mut rx).await;
    let sources = events
        .iter()
        .find_map(|e| match e {
            ResearchEvent::Sources { sources } => Some(sources),
            _ => None,
        })
        .expect("a sources event");
    // Only the chat-owned document's chunk made it through; the caller's
    // cross-chat id was never honored.
    for source in sources {
        if let Some(document_id) = source.extra.get("document_id") {
            assert_eq!(document_id.as_str(), Some("own-doc"));
        }
    }
}

/// S6 — Cancellation: cancelling before the graph runs still produces a
/// terminal event rather than hanging the caller.
#[tokio::test]
async fn s6_cancelling_before_the_graph_runs_still_completes() {
    let gateway: Arc<dyn Gateway> = Arc::new(
        FakeGateway::new().with_json_responses(vec![plan_json(&["rag", "synthesis"]), verified_json()]),
    );
    let vector_index = Arc::new(InMemoryVectorIndex::new());
    seed_vector_index(&vector_index, gateway.as_ref(), "u1", "doc-1").await;

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        vector_index,
        Arc::new(NoopWeb),
        Arc::new(InMemoryMemoryStore::new(gateway)),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryObjectStorage::new()),
        Arc::new(InMemoryDocumentRegistry::new()),
        ResearchConfig::default(),
    );

    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let (tx, mut rx) = mpsc::channel(256);
    let request = ResearchRequest {
        query: "what is the capital of france".to_string(),
        user_id: "u1".to_string(),
        chat_id: "c1".to_string(),
        thread_id: "t1".to_string(),
        use_web: false,
        document_ids: None,
        max_iterations: Some(2),
    };

    // A pre-cancelled token must not hang the session; it should still reach
    // a terminal event (synthesis observes is_cancelled() and stops early).
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), orchestrator.run(request, tx, cancellation)).await;
    assert!(outcome.is_ok(), "session should not hang when cancelled up front");

    let events = drain(&mut rx).await;
    assert!(events
        .iter()
        .any(|e| matches!(e, ResearchEvent::Complete { .. } | ResearchEvent::Error { .. })));
}
