// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use conductor_model::{Error, ErrorKind, Result};

/// The moments in the inference loop at which hooks fire.
///
/// `ContextExceeded` is defined for operator compatibility but the runtime
/// never fires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    ConversationStarted,
    ConversationEnded,
    PreToolUse,
    PostToolUse,
    PreContextCompaction,
    PostContextCompaction,
    ContextExceeded,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationStarted => "conversation_started",
            Self::ConversationEnded => "conversation_ended",
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::PreContextCompaction => "pre_context_compaction",
            Self::PostContextCompaction => "post_context_compaction",
            Self::ContextExceeded => "context_exceeded",
        }
    }

    /// True for the tool-scoped events, which carry tool payload fields and
    /// use the tool-message veto envelope.
    pub fn is_tool_event(&self) -> bool {
        matches!(self, Self::PreToolUse | Self::PostToolUse)
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator-supplied program shelled out at a hook point.
///
/// Purely CRUD from the runtime's perspective; the loop only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub id: Uuid,
    pub event_type: HookEvent,
    /// Agent name this hook applies to; empty string or "*" matches all.
    #[serde(default)]
    pub agent_name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub enabled: bool,
}

impl Hook {
    pub fn new(
        event_type: HookEvent,
        agent_name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        enabled: bool,
    ) -> Result<Self> {
        const OP: &str = "hook.new";

        let hook = Self {
            id: Uuid::now_v7(),
            event_type,
            agent_name: agent_name.into(),
            command: command.into(),
            args,
            enabled,
        };
        hook.validate().map_err(|e| Error::wrap(OP, e))?;
        Ok(hook)
    }

    pub fn validate(&self) -> Result<()> {
        const OP: &str = "hook.validate";

        if self.command.trim().is_empty() {
            return Err(Error::new(OP, ErrorKind::Invalid, "command must not be empty"));
        }
        Ok(())
    }

    pub fn is_wildcard(&self) -> bool {
        self.agent_name.is_empty() || self.agent_name == "*"
    }

    /// Whether this hook applies to the given agent.
    pub fn matches_agent(&self, agent_name: &str) -> bool {
        self.enabled && (self.is_wildcard() || self.agent_name == agent_name)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hook(agent: &str, enabled: bool) -> Hook {
        Hook::new(HookEvent::PreToolUse, agent, "/bin/true", vec![], enabled).unwrap()
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = Hook::new(HookEvent::ConversationEnded, "", "  ", vec![], true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn wildcard_forms_match_every_agent() {
        assert!(hook("", true).matches_agent("reviewer"));
        assert!(hook("*", true).matches_agent("reviewer"));
    }

    #[test]
    fn named_hook_matches_only_its_agent() {
        let h = hook("reviewer", true);
        assert!(h.matches_agent("reviewer"));
        assert!(!h.matches_agent("coder"));
    }

    #[test]
    fn disabled_hook_never_matches() {
        assert!(!hook("*", false).matches_agent("reviewer"));
    }

    #[test]
    fn event_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&HookEvent::PreContextCompaction).unwrap(),
            "\"pre_context_compaction\""
        );
        let back: HookEvent = serde_json::from_str("\"context_exceeded\"").unwrap();
        assert_eq!(back, HookEvent::ContextExceeded);
    }

    #[test]
    fn tool_events_are_flagged() {
        assert!(HookEvent::PreToolUse.is_tool_event());
        assert!(HookEvent::PostToolUse.is_tool_event());
        assert!(!HookEvent::ConversationEnded.is_tool_event());
    }
}
