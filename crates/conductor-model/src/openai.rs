// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI Responses-API driver.
//!
//! To avoid re-sending the full transcript on every turn, the driver
//! remembers how many messages preceded each issued `response_id` and sends
//! only the tail delta when the caller supplies `previous_response_id`.
//! The map is an optimization invisible above the [`LlmProvider`] port.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Error, ErrorKind, Result};
use crate::estimate;
use crate::provider::LlmProvider;
use crate::types::{ChatRequest, ChatResponse, Message, Role, TokenUsage, ToolCall, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// response_id → number of transcript messages that preceded it.
    /// Shared across conversations; guarded for parallel instances.
    responses_to_messages: Mutex<HashMap<String, usize>>,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            responses_to_messages: Mutex::new(HashMap::new()),
        }
    }

    /// Slice off the prefix already held by the provider for `previous_id`.
    fn delta_messages<'a>(&self, previous_id: &str, messages: &'a [Message]) -> &'a [Message] {
        let map = self.responses_to_messages.lock().unwrap_or_else(|e| e.into_inner());
        match map.get(previous_id) {
            Some(&sent) if sent <= messages.len() => &messages[sent..],
            Some(_) => &messages[..0],
            None => messages,
        }
    }

    fn record_response(&self, response_id: &str, message_count: usize) {
        let mut map = self.responses_to_messages.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(response_id.to_string(), message_count);
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, model: &str, request: &ChatRequest) -> Result<ChatResponse> {
        const OP: &str = "openai.chat";

        let original_message_count = request.messages.len();

        let messages: &[Message] = match &request.previous_response_id {
            Some(prev) => self.delta_messages(prev, &request.messages),
            None => &request.messages,
        };

        let mut body = json!({
            "model": model,
            "input": messages_to_input_items(messages),
        });

        if let Some(prev) = &request.previous_response_id {
            body["previous_response_id"] = json!(prev);
        }

        let mut tools = build_function_tools(&request.tools)?;
        if request.web_search {
            tools.push(json!({"type": "web_search"}));
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools);
        }

        if is_reasoning_model(model) {
            body["reasoning"] = json!({"effort": request.reasoning_effort.as_str()});
        }

        if let Some(schema) = &request.structured_output_schema {
            body["text"] = json!({
                "format": {
                    "type": "json_schema",
                    "name": "structured_output",
                    "schema": schema,
                    "strict": false,
                }
            });
        }

        debug!(model, messages = messages.len(), "sending responses request");

        let http_response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "request failed", e))?;

        let status = http_response.status();
        if !status.is_success() {
            let detail = http_response.text().await.unwrap_or_default();
            return Err(Error::new(
                OP,
                ErrorKind::Internal,
                format!("responses API call failed with status {status}: {detail}"),
            ));
        }

        let payload: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Internal, "malformed response body", e))?;

        let usage = TokenUsage {
            input_tokens: payload.usage.input_tokens,
            // Reasoning tokens are billed as output; fold them in here so the
            // caller's accounting and cost math see a single number.
            output_tokens: payload.usage.output_tokens
                + payload.usage.output_tokens_details.reasoning_tokens,
            cache_read_tokens: payload.usage.input_tokens_details.cached_tokens,
            cache_write_tokens: 0,
        };

        info!(
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cached_tokens = usage.cache_read_tokens,
            "openai response"
        );

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in &payload.output {
            match item.kind.as_str() {
                "message" => {
                    for part in &item.content {
                        if part.kind == "output_text" && !part.text.is_empty() {
                            text.push_str(&part.text);
                        }
                    }
                }
                "function_call" => {
                    tool_calls.push(ToolCall {
                        name: item.name.clone(),
                        call_id: item.call_id.clone(),
                        arguments: item.arguments.clone(),
                    });
                }
                // "reasoning", "web_search_call" and friends carry no
                // transcript-visible payload.
                _ => {}
            }
        }

        self.record_response(&payload.id, original_message_count);

        Ok(ChatResponse {
            id: payload.id,
            text,
            tool_calls,
            usage,
        })
    }

    fn estimate_input_tokens(&self, model: &str, messages: &[Message]) -> Result<usize> {
        Ok(estimate::estimate_input_tokens(model, messages))
    }

    async fn validate_model(&self, model: &str) -> Result<()> {
        const OP: &str = "openai.validate_model";

        if model.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "model is required"));
        }

        let response = self
            .client
            .get(format!("{}/models/{}", self.base_url, model))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::with_source(OP, ErrorKind::Unavailable, "request failed", e))?;

        if !response.status().is_success() {
            return Err(Error::new(
                OP,
                ErrorKind::Invalid,
                format!("model {model} does not exist"),
            ));
        }

        Ok(())
    }
}

/// Convert the generic transcript into Responses API input items.
///
/// User/system history goes out as input messages, assistant text as an
/// output message, persisted tool calls as `function_call` items, and tool
/// results as `function_call_output` tied to the original call id.
fn messages_to_input_items(messages: &[Message]) -> Vec<Value> {
    let mut items = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System | Role::User => {
                items.push(json!({
                    "type": "message",
                    "role": if msg.role == Role::System { "system" } else { "user" },
                    "content": [{"type": "input_text", "text": msg.content}],
                }));
            }
            Role::Assistant => {
                if let Some(call) = &msg.tool_call {
                    items.push(json!({
                        "type": "function_call",
                        "call_id": call.call_id,
                        "name": call.name,
                        "arguments": call.arguments,
                    }));
                } else {
                    items.push(json!({
                        "type": "message",
                        "role": "assistant",
                        "content": [{"type": "output_text", "text": msg.content}],
                    }));
                }
            }
            Role::Tool => {
                // The call_id MUST match the model's function_call.call_id.
                items.push(json!({
                    "type": "function_call_output",
                    "call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
                    "output": msg.content,
                }));
            }
        }
    }

    items
}

fn build_function_tools(definitions: &[ToolDefinition]) -> Result<Vec<Value>> {
    const OP: &str = "openai.build_function_tools";

    let mut tools = Vec::with_capacity(definitions.len());
    for definition in definitions {
        if definition.name.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "tool name is required"));
        }

        let mut parameters = match &definition.schema {
            Value::Object(map) => Value::Object(map.clone()),
            Value::Null => json!({}),
            other => {
                return Err(Error::new(
                    OP,
                    ErrorKind::Invalid,
                    format!("tool {} schema must be a JSON object, got {other}", definition.name),
                ))
            }
        };

        // Minimal valid JSON Schema scaffold.
        if parameters.get("type").is_none() {
            parameters["type"] = json!("object");
        }
        if parameters.get("properties").is_none() {
            parameters["properties"] = json!({});
        }
        // Keep the human guidance visible in the schema root; don't clobber
        // an author-provided description.
        if !definition.description.is_empty() && parameters.get("description").is_none() {
            parameters["description"] = json!(definition.description);
        }

        tools.push(json!({
            "type": "function",
            "name": definition.name,
            "parameters": parameters,
            "strict": false,
        }));
    }

    Ok(tools)
}

fn is_reasoning_model(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("gpt-5") || m.starts_with('o')
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentItem>,
    #[serde(default)]
    call_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
    #[serde(default)]
    input_tokens_details: InputTokensDetails,
    #[serde(default)]
    output_tokens_details: OutputTokensDetails,
}

#[derive(Debug, Default, Deserialize)]
struct InputTokensDetails {
    #[serde(default)]
    cached_tokens: i64,
}

#[derive(Debug, Default, Deserialize)]
struct OutputTokensDetails {
    #[serde(default)]
    reasoning_tokens: i64,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
