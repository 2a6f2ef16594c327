//! Error taxonomy for the research service, organized by effect rather than
//! by source type, per the propagation policy: retryable errors degrade a
//! node's output, fatal errors cancel the graph.

use thiserror::Error;

/// Result type used throughout the `research` crate.
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Errors raised by the embedding/LLM gateway (C1).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("provider error: {0}")]
    Provider(String),
}

impl GatewayError {
    /// Retryable errors may degrade a node's output; fatal ones cancel the graph.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Authentication(_))
    }
}

/// Errors raised by the vector index client (C2).
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("upsert failed: {0}")]
    UpsertFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised by the web search client (C4).
#[derive(Debug, Error)]
pub enum WebSearchError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("no results from any expanded query")]
    NoResults,
}

/// Errors raised by the memory store (C5).
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors raised by external persistence collaborators (§6 relational tables, object storage).
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session store error: {0}")]
    Session(String),
    #[error("object storage error: {0}")]
    Storage(String),
    #[error("chat title service error: {0}")]
    Title(String),
}

/// Crate-level error wrapping every collaborator's error, returned by graph
/// nodes and the orchestrator. Mirrors `langgraph_core::error::GraphError`'s
/// role of boxing node failures for the engine.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),
    #[error("web search error: {0}")]
    WebSearch(#[from] WebSearchError),
    #[error("memory store error: {0}")]
    MemoryStore(#[from] MemoryStoreError),
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("graph error: {0}")]
    Graph(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("cancelled")]
    Cancelled,
}

impl ResearchError {
    /// Whether this error should cancel the whole graph (fatal) rather than
    /// degrade a single node's output (recoverable). Policy is set here, not
    /// inferred at call sites, per spec §4.1 "Failure semantics".
    pub fn is_fatal(&self) -> bool {
        match self {
            ResearchError::Gateway(e) => e.is_fatal(),
            ResearchError::Configuration(_) => true,
            ResearchError::Cancelled => true,
            _ => false,
        }
    }
}
