//! Core of a multi-agent research service: a query is decomposed into a
//! plan, evidence is gathered concurrently from an internal document index
//! and a web search provider, a grounded answer is synthesized with inline
//! citations while tokens stream to the caller, the answer is verified
//! against cited evidence, and refined in a bounded feedback loop when
//! verification indicates low confidence.
//!
//! Transport framing, authentication, relational persistence schemas beyond
//! `research_sessions`/`agent_logs`, file parsing, and the concrete
//! embedding/LLM/web-search/object-storage providers are out of scope —
//! callers inject implementations of the narrow collaborator traits in
//! [`gateway`], [`vector`], [`web_search`], [`memory_store`], and
//! [`persistence`].

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod graph;
pub mod json_recovery;
pub mod memory_store;
pub mod orchestrator;
pub mod persistence;
pub mod retrieval;
pub mod state;
pub mod vector;
pub mod web_search;

pub use error::{ResearchError, Result};
pub use orchestrator::{DocumentRegistry, InMemoryDocumentRegistry, Orchestrator, ResearchRequest};
pub use state::ResearchState;
