// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChatRequest, ChatResponse, Message};
use crate::catalog;

/// Provider-agnostic chat contract consumed by the inference loop.
///
/// Any provider whose SDK offers chat-with-tool-calls, a reasoning-effort
/// knob, and an optional continuation token can back this port.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name for logs and status display.
    fn name(&self) -> &str;

    /// Send one chat turn and return the model's response.
    async fn chat(&self, model: &str, request: &ChatRequest) -> Result<ChatResponse>;

    /// Deterministic input token count for the given transcript.
    ///
    /// Uses the model's tokenizer where available and a best-effort
    /// approximation otherwise.  Monotonic in message length.
    fn estimate_input_tokens(&self, model: &str, messages: &[Message]) -> Result<usize>;

    /// Fail fast on unknown model identifiers.  Used at spec-creation time.
    async fn validate_model(&self, model: &str) -> Result<()>;

    /// Error when `input_tokens` exceeds `compact_at_percent` percent of the
    /// model's context window.
    ///
    /// The default implementation reads the bundled catalog; unknown models
    /// pass unchecked.
    fn check_context_window(
        &self,
        model: &str,
        input_tokens: usize,
        compact_at_percent: u32,
    ) -> Result<()> {
        catalog::check_context_window(model, input_tokens, compact_at_percent)
    }

    /// Total cost in USD cents with half-up rounding.  Unknown model ⇒ 0.
    ///
    /// The default implementation reads the bundled pricing table.
    fn calculate_cost(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
        cached_tokens: i64,
    ) -> i64 {
        catalog::calculate_cost(model, input_tokens, output_tokens, cached_tokens)
    }
}

impl std::fmt::Debug for dyn LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProvider").field("name", &self.name()).finish()
    }
}
