//! C1 — Embedding/LLM Gateway: a uniform interface to dense embeddings, text
//! generation, JSON generation, token streaming (with optional reasoning
//! tokens), multimodal generation, and image generation (spec §4, C1 table).
//!
//! This extends `langgraph_core::llm::ChatModel`'s trait-per-provider design
//! (provider-agnostic, `async_trait`, `Send + Sync`, boxed for
//! `Arc<dyn Gateway>` sharing across graph nodes) to the additional
//! operations the research pipeline needs beyond chat: embeddings and image
//! generation, which `llm::remote::*` does not cover because the teacher's
//! providers there only implement chat/completion.

pub mod fake;

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// One item of a streamed generation: either a reasoning/thought token
/// (opaque to the graph engine, forwarded as-is) or a user-visible answer
/// token (spec §4.6).
#[derive(Debug, Clone)]
pub enum GatewayStreamItem {
    Thought(String),
    Text(String),
}

pub type GatewayStream = BoxStream<'static, GatewayStreamItem>;

/// Multimodal input: text plus zero or more images, for
/// `generate_with_images` (spec §4.6 "Multimodal").
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// The uniform interface every research node talks to (C1). A single
/// process-wide `Arc<dyn Gateway>` is shared across sessions (spec §5
/// "Shared resources").
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Dense embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dense embeddings for a batch of texts, in the same order as input.
    /// Callers batch at `embedding_batch_size` (spec §5 fixed invariant);
    /// implementations may further chunk internally.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Plain text generation.
    async fn generate(&self, prompt: &str, system: Option<&str>, max_tokens: usize)
        -> Result<String>;

    /// Generation constrained to return JSON text (the caller still runs it
    /// through [`crate::json_recovery::recover_json`] — providers are not
    /// trusted to always emit valid JSON).
    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: Option<usize>,
    ) -> Result<String>;

    /// Token-level streaming generation, optionally including a separate
    /// reasoning/thought channel (spec §4.6).
    async fn generate_stream(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: usize,
        include_thoughts: bool,
    ) -> Result<GatewayStream>;

    /// Multimodal generation given text plus image bytes.
    async fn generate_with_images(
        &self,
        prompt: &str,
        system: Option<&str>,
        images: &[ImageBytes],
    ) -> Result<String>;

    /// Image generation; returns `n` images as raw bytes (spec C9 image-gen).
    async fn generate_image(&self, prompt: &str, n: usize) -> Result<Vec<Vec<u8>>>;
}

/// Wrap a provider error that is a hard stop (bad credentials, malformed
/// request) vs one a node can recover from by returning a partial/degraded
/// output (timeout, rate limit, transient 5xx) — spec §7 error taxonomy.
pub fn classify_timeout(elapsed_past_deadline: bool, context: &str) -> GatewayError {
    if elapsed_past_deadline {
        GatewayError::Timeout(context.to_string())
    } else {
        GatewayError::Provider(context.to_string())
    }
}
