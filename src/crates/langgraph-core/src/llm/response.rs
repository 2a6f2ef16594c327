//! Response types returned by [`ChatModel`](crate::llm::ChatModel) implementations.

use crate::llm_stream::MessageChunkStream;
use crate::Message;
use serde_json::Value;
use std::collections::HashMap;

/// A complete response from a chat model.
///
/// Returned by [`ChatModel::chat`](crate::llm::ChatModel::chat). Bundles the
/// assistant message with usage accounting and, for thinking models, the
/// separated reasoning trace.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// The assistant message produced by the model.
    pub message: Message,

    /// Token usage for this call, when the provider reports it.
    pub usage: Option<UsageMetadata>,

    /// Reasoning/thinking content, present only for `ReasoningMode::Separated`.
    pub reasoning: Option<ReasoningContent>,

    /// Provider-specific metadata (model name, stop reason, etc.).
    pub metadata: HashMap<String, Value>,
}

/// A streaming response from a chat model.
///
/// Returned by [`ChatModel::stream`](crate::llm::ChatModel::stream). The
/// `stream` field yields text chunks as they arrive; `reasoning_stream`, when
/// present, yields the model's reasoning tokens on a separate channel so
/// callers can distinguish thought tokens from answer tokens without parsing.
pub struct ChatStreamResponse {
    /// Stream of assistant message chunks.
    pub stream: MessageChunkStream,

    /// Stream of reasoning chunks, for thinking models in `Separated` mode.
    pub reasoning_stream: Option<MessageChunkStream>,

    /// Provider-specific metadata known before the stream completes.
    pub metadata: HashMap<String, Value>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageMetadata {
    /// Tokens consumed by the prompt/input.
    pub input_tokens: u32,
    /// Tokens produced by the completion/output.
    pub output_tokens: u32,
}

impl UsageMetadata {
    /// Construct usage metadata from provider-reported input/output counts.
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens across input and output.
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Reasoning/thinking content separated from the final answer.
#[derive(Debug, Clone, Default)]
pub struct ReasoningContent {
    /// The reasoning trace text.
    pub content: String,
    /// Number of reasoning tokens, when reported.
    pub tokens: Option<u32>,
}
