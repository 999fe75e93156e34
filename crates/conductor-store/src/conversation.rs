// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use conductor_model::{
    Error, ErrorKind, Message, ReasoningEffort, Result, Role, ToolCall, ToolDefinition,
};

use crate::spec::{AgentSpec, ProviderTag};
use crate::status::ConversationStatus;

/// The persisted transcript and metadata of one agent interaction session.
///
/// Self-contained by construction: every behavior-affecting spec field is
/// snapshotted at birth, so the conversation stays runnable after its spec
/// is edited or deleted.  The row is the single source of truth between
/// jobs; in-flight mutation happens only through the owning job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub agent_spec_id: Uuid,
    pub agent_name: String,
    pub provider: ProviderTag,
    pub model: String,
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    pub instructions: String,
    #[serde(default)]
    pub auto_compact: bool,
    #[serde(default)]
    pub compact_at_percent: u32,
    #[serde(default)]
    pub compaction_prompt: String,
    #[serde(default)]
    pub compact_count: u32,
    #[serde(default)]
    pub shell_access: bool,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default)]
    pub structured_output_schema: Option<Value>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Tools discovered at conversation start, snapshotted so later
    /// invocations are reproducible.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub status: ConversationStatus,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cached_tokens: i64,
    /// Accumulated cost in USD cents.
    #[serde(default)]
    pub cost: i64,
    /// Opaque client-supplied grouping key, applied only as a query filter.
    #[serde(default)]
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation from a spec, snapshotting all of its
    /// behavior-affecting fields.  `messages` is the initial transcript and
    /// must start with the system message.
    pub fn from_spec(spec: &AgentSpec, messages: Vec<Message>) -> Result<Self> {
        const OP: &str = "conversation.from_spec";

        let conversation = Self {
            id: Uuid::now_v7(),
            agent_spec_id: spec.id,
            agent_name: spec.name.clone(),
            provider: spec.provider,
            model: spec.model.clone(),
            reasoning_effort: spec.reasoning_effort,
            instructions: spec.instructions.clone(),
            auto_compact: spec.auto_compact,
            compact_at_percent: spec.compact_at_percent,
            compaction_prompt: spec.compaction_prompt.clone(),
            compact_count: 0,
            shell_access: spec.shell_access,
            web_search: spec.web_search,
            structured_output: spec.structured_output,
            structured_output_schema: spec.structured_output_schema.clone(),
            allowed_tools: spec.allowed_tools.clone(),
            tools: Vec::new(),
            messages,
            status: ConversationStatus::Queued,
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            cost: 0,
            session_id: String::new(),
            created_at: Utc::now(),
        };
        conversation.validate().map_err(|e| Error::wrap(OP, e))?;
        Ok(conversation)
    }

    pub fn validate(&self) -> Result<()> {
        const OP: &str = "conversation.validate";

        if self.agent_spec_id.is_nil() {
            return Err(Error::new(OP, ErrorKind::Invalid, "agent_spec_id is required"));
        }
        if self.agent_name.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "agent_name is required"));
        }
        if self.instructions.is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "instructions are required"));
        }
        Ok(())
    }

    /// Copy this conversation into a fresh one: new time-ordered id, current
    /// timestamp, zeroed token counters, queued status.
    ///
    /// `discard_messages=true` keeps only the leading system message — the
    /// shape compaction needs for its freshly seeded clone.
    pub fn clone_conversation(&self, discard_messages: bool) -> Result<Conversation> {
        const OP: &str = "conversation.clone";

        let messages = if discard_messages {
            self.messages
                .iter()
                .take_while(|m| m.role == Role::System)
                .take(1)
                .cloned()
                .collect()
        } else {
            self.messages.clone()
        };

        let clone = Conversation {
            id: Uuid::now_v7(),
            messages,
            status: ConversationStatus::Queued,
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            cost: 0,
            created_at: Utc::now(),
            ..self.clone()
        };
        clone.validate().map_err(|e| Error::wrap(OP, e))?;
        Ok(clone)
    }

    // ── Transcript mutators (append-only) ────────────────────────────────────

    pub fn add_message(&mut self, role: Role, content: &str) {
        let message = match role {
            Role::System => Message::system(content),
            Role::User => Message::user(content),
            Role::Assistant => Message::assistant(content),
            Role::Tool => {
                error!("tool messages must be added through add_tool_message");
                return;
            }
        };
        self.messages.push(message);
    }

    pub fn add_tool_message(&mut self, tool_name: &str, call_id: &str, content: &str) {
        self.messages.push(Message::tool(tool_name, call_id, content));
    }

    pub fn add_assistant_tool_call(&mut self, tool_call: ToolCall) {
        self.messages.push(Message::assistant_tool_call(tool_call));
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// The most recent natural-language assistant reply, skipping
    /// tool-call-only assistant messages.
    pub fn latest_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_call.is_none())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> AgentSpec {
        let mut s = AgentSpec::new("coder", ProviderTag::Mock, "gpt-5", "You write code.").unwrap();
        s.auto_compact = true;
        s.compaction_prompt = "Summarize the conversation so far".into();
        s.compact_at_percent = 80;
        s
    }

    fn conversation() -> Conversation {
        let s = spec();
        Conversation::from_spec(&s, vec![Message::system(&s.instructions)]).unwrap()
    }

    #[test]
    fn from_spec_snapshots_behavior_fields() {
        let s = spec();
        let c = Conversation::from_spec(&s, vec![Message::system(&s.instructions)]).unwrap();
        assert_eq!(c.agent_spec_id, s.id);
        assert_eq!(c.agent_name, "coder");
        assert_eq!(c.model, "gpt-5");
        assert!(c.auto_compact);
        assert_eq!(c.compact_at_percent, 80);
        assert_eq!(c.compaction_prompt, s.compaction_prompt);
        assert_eq!(c.status, ConversationStatus::Queued);
        assert_eq!(c.compact_count, 0);
    }

    #[test]
    fn first_message_is_the_system_message() {
        let c = conversation();
        assert_eq!(c.messages[0].role, Role::System);
        assert_eq!(c.messages[0].content, "You write code.");
    }

    #[test]
    fn mutators_append_in_order() {
        let mut c = conversation();
        c.add_message(Role::User, "run ls");
        c.add_assistant_tool_call(ToolCall {
            name: "shell".into(),
            call_id: "c1".into(),
            arguments: "{}".into(),
        });
        c.add_tool_message("shell", "c1", "README.md");
        c.add_message(Role::Assistant, "done");
        let roles: Vec<Role> = c.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(c.messages[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn add_message_refuses_tool_role() {
        let mut c = conversation();
        let before = c.messages.len();
        c.add_message(Role::Tool, "nope");
        assert_eq!(c.messages.len(), before);
    }

    #[test]
    fn latest_assistant_message_skips_tool_calls() {
        let mut c = conversation();
        c.add_message(Role::Assistant, "first reply");
        c.add_assistant_tool_call(ToolCall {
            name: "shell".into(),
            call_id: "c1".into(),
            arguments: "{}".into(),
        });
        let latest = c.latest_assistant_message().unwrap();
        assert_eq!(latest.content, "first reply");
    }

    #[test]
    fn latest_assistant_message_none_when_no_text_reply() {
        let c = conversation();
        assert!(c.latest_assistant_message().is_none());
    }

    #[test]
    fn fork_copies_messages_and_zeroes_counters() {
        let mut c = conversation();
        c.add_message(Role::User, "hello");
        c.add_message(Role::Assistant, "hi");
        c.input_tokens = 100;
        c.output_tokens = 50;
        c.cached_tokens = 10;
        c.cost = 3;
        c.status = ConversationStatus::Succeeded;

        let fork = c.clone_conversation(false).unwrap();
        assert_ne!(fork.id, c.id);
        assert!(fork.id > c.id, "fresh id must sort after the original");
        assert_eq!(fork.messages, c.messages);
        assert_eq!(fork.input_tokens, 0);
        assert_eq!(fork.output_tokens, 0);
        assert_eq!(fork.cached_tokens, 0);
        assert_eq!(fork.cost, 0);
        assert_eq!(fork.status, ConversationStatus::Queued);
        assert!(fork.created_at >= c.created_at);
    }

    #[test]
    fn discarding_clone_keeps_only_the_system_message() {
        let mut c = conversation();
        c.add_message(Role::User, "hello");
        c.add_message(Role::Assistant, "hi");
        let clone = c.clone_conversation(true).unwrap();
        assert_eq!(clone.messages.len(), 1);
        assert_eq!(clone.messages[0].role, Role::System);
    }

    #[test]
    fn transcript_round_trips_through_json() {
        let mut c = conversation();
        c.add_message(Role::User, "hello");
        c.add_assistant_tool_call(ToolCall {
            name: "shell".into(),
            call_id: "c9".into(),
            arguments: r#"{"command":"pwd"}"#.into(),
        });
        c.add_tool_message("shell", "c9", "/work");
        let json = serde_json::to_string(&c).unwrap();
        let back: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.messages, c.messages);
        assert_eq!(back.id, c.id);
        assert_eq!(back.status, c.status);
    }
}
