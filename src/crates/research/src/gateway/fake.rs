//! An in-process [`Gateway`] used by tests and by the example scenarios in
//! `tests/`. Deterministic so the suite never makes network calls, mirroring
//! how `llm::local::*` clients talk to a local process instead of a cloud API.

use super::{Gateway, GatewayStream, GatewayStreamItem, ImageBytes};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted text responses for `generate`/`generate_json`, consumed in
/// order (cycling) so a single fake can serve the multiple distinct prompts
/// one research session issues (rewrite, plan, critic, ...).
pub struct FakeGateway {
    json_responses: Mutex<Vec<String>>,
    text_response: String,
    stream_script: Vec<String>,
    image_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            json_responses: Mutex::new(Vec::new()),
            text_response: "a rewritten query".to_string(),
            stream_script: vec![
                "Paris".to_string(),
                " is".to_string(),
                " the".to_string(),
                " capital".to_string(),
                " of".to_string(),
                " France".to_string(),
                " [Source".to_string(),
                " 1]".to_string(),
                ".".to_string(),
            ],
            image_calls: AtomicUsize::new(0),
        }
    }

    /// Queue JSON responses to be returned in order by successive
    /// `generate_json` calls (plan, web-expansion, critic verdict, ...).
    pub fn with_json_responses(mut self, responses: Vec<String>) -> Self {
        self.json_responses = Mutex::new(responses);
        self
    }

    pub fn with_stream_script(mut self, tokens: Vec<String>) -> Self {
        self.stream_script = tokens;
        self
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(deterministic_embedding(text, 16))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| deterministic_embedding(t, 16)).collect())
    }

    async fn generate(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _max_tokens: usize,
    ) -> Result<String> {
        Ok(self.text_response.clone())
    }

    async fn generate_json(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
        _max_tokens: Option<usize>,
    ) -> Result<String> {
        let mut queue = self.json_responses.lock().unwrap();
        if queue.is_empty() {
            Ok("{}".to_string())
        } else {
            Ok(queue.remove(0))
        }
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _temperature: f32,
        _max_tokens: usize,
        include_thoughts: bool,
    ) -> Result<GatewayStream> {
        let mut items = Vec::new();
        if include_thoughts {
            items.push(GatewayStreamItem::Thought(
                "considering the available sources".to_string(),
            ));
        }
        for tok in &self.stream_script {
            items.push(GatewayStreamItem::Text(tok.clone()));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    async fn generate_with_images(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _images: &[ImageBytes],
    ) -> Result<String> {
        Ok(self.text_response.clone())
    }

    async fn generate_image(&self, _prompt: &str, n: usize) -> Result<Vec<Vec<u8>>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..n).map(|i| vec![0x89, b'P', b'N', b'G', i as u8]).collect())
    }
}

fn deterministic_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut seed: u64 = 1469598103934665603;
    for b in text.bytes() {
        seed ^= b as u64;
        seed = seed.wrapping_mul(1099511628211);
    }
    (0..dims)
        .map(|i| {
            seed = seed.wrapping_add(i as u64).wrapping_mul(2654435761);
            ((seed >> 33) % 1000) as f32 / 1000.0
        })
        .collect()
}
