use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
///
/// `call_id` is assigned by the provider and must be echoed verbatim when the
/// tool result is returned.  `arguments` is the raw JSON string exactly as
/// the model produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

impl ToolCall {
    /// Best-effort human-readable command for hook error envelopes.
    ///
    /// Extracts the `command` argument when present (the shell tool), falls
    /// back to the raw argument string, then to the tool name.
    pub fn command_string(&self) -> String {
        if let Ok(value) = serde_json::from_str::<Value>(&self.arguments) {
            if let Some(cmd) = value.get("command").and_then(|v| v.as_str()) {
                let cmd = cmd.trim();
                if !cmd.is_empty() {
                    return cmd.to_string();
                }
            }
        }
        let trimmed = self.arguments.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        self.name.clone()
    }
}

/// A provider-agnostic representation of a single chat turn or tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Tool name, set on tool-role messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maps a tool-role message back to the provider's call identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Captures assistant-issued tool calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_call: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_call: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_call: None,
        }
    }

    pub fn tool(
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(tool_name.into()),
            tool_call_id: Some(call_id.into()),
            tool_call: None,
        }
    }

    /// Records a tool call emitted by the assistant.  Assistant messages carry
    /// either text content or a tool call, never both.
    pub fn assistant_tool_call(tool_call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            name: Some(tool_call.name.clone()),
            tool_call_id: Some(tool_call.call_id.clone()),
            tool_call: Some(tool_call),
        }
    }

    /// True for assistant messages that carry a tool call instead of text.
    pub fn is_tool_call(&self) -> bool {
        self.tool_call.is_some()
    }
}

// ─── Tool definitions ─────────────────────────────────────────────────────────

/// A tool surfaced to the model, discovered from an MCP server at
/// conversation start and snapshotted onto the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub schema: Value,
}

// ─── Provider request/response ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    #[default]
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub reasoning_effort: ReasoningEffort,
    /// Opaque continuation token issued by the provider on the previous turn.
    pub previous_response_id: Option<String>,
    pub web_search: bool,
    /// JSON Schema the final assistant text must conform to.
    pub structured_output_schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cache_read_tokens: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cache_write_tokens: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    /// Opaque response id; the next turn's continuation token.
    pub id: String,
    /// Final assistant text.  Empty while tool calls are pending.
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

impl ChatResponse {
    /// Test/mock helper: a plain text response.
    pub fn text_reply(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Test/mock helper: a response consisting of a single tool call.
    pub fn tool_call_reply(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_calls: vec![ToolCall {
                name: tool_name.into(),
                call_id: call_id.into(),
                arguments: arguments.into(),
            }],
            ..Default::default()
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool("shell", "c1", "out").role, Role::Tool);
    }

    #[test]
    fn tool_message_carries_name_and_call_id() {
        let m = Message::tool("shell", "call-1", "{}");
        assert_eq!(m.name.as_deref(), Some("shell"));
        assert_eq!(m.tool_call_id.as_deref(), Some("call-1"));
        assert!(m.tool_call.is_none());
    }

    #[test]
    fn assistant_tool_call_has_no_text() {
        let m = Message::assistant_tool_call(ToolCall {
            name: "shell".into(),
            call_id: "c".into(),
            arguments: "{}".into(),
        });
        assert!(m.is_tool_call());
        assert!(m.content.is_empty());
        assert_eq!(m.tool_call_id.as_deref(), Some("c"));
    }

    #[test]
    fn message_serialization_omits_empty_optionals() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!json.contains("tool_call_id"), "optionals must be omitted: {json}");
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Message::user("hi"));
    }

    #[test]
    fn tool_call_round_trips_through_json() {
        let tc = ToolCall {
            name: "shell".into(),
            call_id: "call_abc".into(),
            arguments: r#"{"command":"ls"}"#.into(),
        };
        let json = serde_json::to_string(&tc).unwrap();
        let back: ToolCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tc);
    }

    #[test]
    fn command_string_extracts_shell_command() {
        let tc = ToolCall {
            name: "shell".into(),
            call_id: "c".into(),
            arguments: r#"{"command":"cargo test","workdir":"a"}"#.into(),
        };
        assert_eq!(tc.command_string(), "cargo test");
    }

    #[test]
    fn command_string_falls_back_to_raw_arguments() {
        let tc = ToolCall {
            name: "search".into(),
            call_id: "c".into(),
            arguments: r#"{"query":"rust"}"#.into(),
        };
        assert_eq!(tc.command_string(), r#"{"query":"rust"}"#);
    }

    #[test]
    fn command_string_falls_back_to_tool_name() {
        let tc = ToolCall {
            name: "noop".into(),
            call_id: "c".into(),
            arguments: "  ".into(),
        };
        assert_eq!(tc.command_string(), "noop");
    }

    #[test]
    fn reasoning_effort_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ReasoningEffort::High).unwrap(), "\"high\"");
        let e: ReasoningEffort = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(e, ReasoningEffort::Low);
    }

    #[test]
    fn reasoning_effort_default_is_medium() {
        assert_eq!(ReasoningEffort::default(), ReasoningEffort::Medium);
    }
}
