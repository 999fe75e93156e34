// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::estimate;
use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, Message, TokenUsage};

/// A pre-scripted mock provider.  Each `chat` call pops the next response
/// from the front of the queue, letting tests specify exact turn sequences
/// — including tool calls — without network access.
pub struct ScriptedProvider {
    responses: Mutex<Vec<ChatResponse>>,
    /// Every `ChatRequest` seen, in order, so tests can inspect what was sent.
    pub requests: Mutex<Vec<ChatRequest>>,
    /// One-shot estimate overrides, consumed front-first.
    forced_estimates: Mutex<Vec<usize>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            forced_estimates: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self::new(vec![ChatResponse {
            id: "resp_mock".into(),
            text: text.into(),
            usage: TokenUsage {
                input_tokens: 5,
                output_tokens: 5,
                ..Default::default()
            },
            ..Default::default()
        }])
    }

    /// Convenience: a tool call followed by a text reply.
    pub fn tool_then_text(
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ChatResponse::tool_call_reply("resp_1", tool_name, call_id, arguments),
            ChatResponse::text_reply("resp_2", final_text),
        ])
    }

    /// Queue a one-shot `estimate_input_tokens` override.  Each queued value
    /// is consumed by exactly one estimate call; afterwards the real
    /// tokenizer takes over.  Used to force the context-window check without
    /// building a giant transcript.
    pub fn force_estimate(&self, tokens: usize) {
        self.forced_estimates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tokens);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn chat(&self, _model: &str, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        if responses.is_empty() {
            // Fallback once all scripts are consumed.
            return Ok(ChatResponse::text_reply("resp_exhausted", "[no more scripts]"));
        }
        Ok(responses.remove(0))
    }

    fn estimate_input_tokens(&self, model: &str, messages: &[Message]) -> Result<usize> {
        let mut forced = self.forced_estimates.lock().unwrap_or_else(|e| e.into_inner());
        if !forced.is_empty() {
            return Ok(forced.remove(0));
        }
        Ok(estimate::estimate_input_tokens(model, messages))
    }

    async fn validate_model(&self, _model: &str) -> Result<()> {
        Ok(())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn request_with(messages: Vec<Message>) -> ChatRequest {
        ChatRequest {
            messages,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn scripted_responses_pop_in_order() {
        let p = ScriptedProvider::tool_then_text("shell", "c1", "{}", "done");
        let first = p.chat("gpt-5", &request_with(vec![Message::user("go")])).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        let second = p.chat("gpt-5", &request_with(vec![])).await.unwrap();
        assert_eq!(second.text, "done");
    }

    #[tokio::test]
    async fn exhausted_scripts_fall_back_to_placeholder() {
        let p = ScriptedProvider::new(vec![]);
        let res = p.chat("gpt-5", &request_with(vec![])).await.unwrap();
        assert!(res.text.contains("no more scripts"));
    }

    #[tokio::test]
    async fn requests_are_recorded_for_inspection() {
        let p = ScriptedProvider::always_text("hi");
        let _ = p
            .chat("gpt-5", &request_with(vec![Message::user("inspect me")]))
            .await
            .unwrap();
        let last = p.last_request().unwrap();
        assert_eq!(last.messages[0].role, Role::User);
        assert_eq!(last.messages[0].content, "inspect me");
        assert_eq!(p.request_count(), 1);
    }

    #[test]
    fn forced_estimate_is_consumed_once() {
        let p = ScriptedProvider::new(vec![]);
        p.force_estimate(320_001);
        let n = p.estimate_input_tokens("gpt-5", &[Message::user("x")]).unwrap();
        assert_eq!(n, 320_001);
        // The override is gone; the real tokenizer answers now.
        assert!(p.estimate_input_tokens("gpt-5", &[Message::user("x")]).unwrap() < 100);
    }

    #[test]
    fn mock_uses_catalog_for_cost_and_window() {
        let p = ScriptedProvider::new(vec![]);
        assert_eq!(p.calculate_cost("gpt-5", 1_000_000, 500_000, 200_000), 627);
        assert!(p.check_context_window("gpt-5", 320_001, 80).is_err());
    }
}
